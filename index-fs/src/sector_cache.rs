//! # 扇区缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的扇区复制到内存中，提高对块设备的操作效率。
//!
//! 缓存的容量固定；装满之后按**安装顺序**淘汰最旧的表项（FIFO）。
//! 这一策略刻意比LRU简单：它是正确性的基线，不是性能的最优解。
//! 脏表项在被淘汰或冲刷时才写回设备，
//! 周期写回与预读这两项后台任务的循环体也由本层提供，
//! 由内核线程（宿主工具里是std线程）驱动。
//!
//! 所有表项状态都在同一把锁之下。需要原子外观的多步操作
//! （建立映射、扩展映射、整段读写）通过 [`SectorCache::lock`]
//! 取得 [`CacheGuard`] 后一路传递，保证整个逻辑操作只加锁一次。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;

use block_dev::BlockDevice;
use spin::{Mutex, MutexGuard};

use crate::DataSector;
use crate::SectorId;
use crate::SECTOR_SIZE;

/// 扇区缓存
#[derive(Debug)]
pub struct SectorCache {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    /// 表项个数的上限
    capacity: usize,
    /// 设备总扇区数，预读不会越过设备末尾
    sector_count: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    /// 表项按安装顺序排列，队首最旧
    entries: VecDeque<CacheEntry>,
    /// 待预读的扇区，只有一个槽位而非队列
    read_ahead: Option<SectorId>,
}

/// 内存中的扇区缓存表项
#[derive(Debug)]
struct CacheEntry {
    sector: SectorId,
    data: Box<DataSector>,
    /// 是否为脏块
    dirty: bool,
}

/// 持有缓存锁的操作句柄
///
/// 同一扇区同一时刻至多有一个表项；持有守卫期间不会有并发修改。
pub struct CacheGuard<'a> {
    cache: &'a SectorCache,
    inner: MutexGuard<'a, CacheInner>,
}

impl SectorCache {
    pub fn new(dev: Arc<dyn BlockDevice>, capacity: usize, sector_count: usize) -> Self {
        assert!(capacity > 0);

        Self {
            dev,
            capacity,
            sector_count,
            inner: Mutex::new(CacheInner {
                entries: VecDeque::with_capacity(capacity),
                read_ahead: None,
            }),
        }
    }

    pub fn lock(&self) -> CacheGuard<'_> {
        CacheGuard {
            cache: self,
            inner: self.inner.lock(),
        }
    }

    /// 周期写回任务的循环体：冲刷所有脏表项
    pub fn flush_all(&self) {
        self.lock().flush_all();
    }

    /// 预读任务的循环体：认领待预读扇区并取回其数据。
    /// 返回这一轮是否有活可干，没有时调用者应当让出CPU。
    pub fn read_ahead_once(&self) -> bool {
        self.lock().run_read_ahead()
    }

    pub fn contains(&self, sector: SectorId) -> bool {
        self.lock().position(sector).is_some()
    }

    pub fn cached_count(&self) -> usize {
        self.lock().inner.entries.len()
    }

    /// 停机：冲刷所有脏表项后丢弃全部缓存。
    /// 两项后台任务必须先于此停止，否则会与缓冲区的释放竞争。
    pub fn shutdown(&self) {
        let mut guard = self.lock();
        guard.flush_all();
        guard.inner.entries.clear();
        guard.inner.read_ahead = None;
    }
}

impl CacheGuard<'_> {
    /// 返回指定扇区的缓冲区，缺失时就地安装。
    ///
    /// 绝不为此从设备读取：旧内容是否要紧由调用者决定，
    /// 要紧就先调 [`CacheGuard::read`]。
    pub fn get_buffer(&mut self, sector: SectorId) -> &mut DataSector {
        let index = match self.position(sector) {
            Some(index) => index,
            None => self.install(sector),
        };
        &mut self.inner.entries[index].data
    }

    /// 确保指定扇区在缓存中且持有设备上的当前内容。
    ///
    /// 只有全新安装才会真正读取设备，同时把下一个扇区
    /// 排进预读槽位；已缓存时什么都不做。
    pub fn read(&mut self, sector: SectorId) {
        if self.position(sector).is_some() {
            return;
        }

        self.install_and_fetch(sector);

        let next = sector + 1;
        if next.index() < self.cache.sector_count {
            self.inner.read_ahead = Some(next);
        }
    }

    /// 将指定扇区标记为脏，实际的设备写入推迟到写回发生时。
    /// 表项缺失时先安装并取回旧内容。
    pub fn write(&mut self, sector: SectorId) {
        let index = match self.position(sector) {
            Some(index) => index,
            None => self.install_and_fetch(sector),
        };
        self.inner.entries[index].dirty = true;
    }

    /// 若指定扇区为脏，同步写回设备并清除脏标记；
    /// 未缓存或不脏时是空操作。
    pub fn flush(&mut self, sector: SectorId) {
        if let Some(index) = self.position(sector) {
            let entry = &mut self.inner.entries[index];
            if entry.dirty {
                self.cache.dev.write_block(entry.sector.index(), &entry.data[..]);
                entry.dirty = false;
            }
        }
    }

    pub fn flush_all(&mut self) {
        for entry in self.inner.entries.iter_mut() {
            if entry.dirty {
                self.cache.dev.write_block(entry.sector.index(), &entry.data[..]);
                entry.dirty = false;
            }
        }
    }

    pub(crate) fn run_read_ahead(&mut self) -> bool {
        let Some(sector) = self.inner.read_ahead.take() else {
            return false;
        };

        // 幂等：目标扇区可能早已被前台读入
        if self.position(sector).is_none() {
            self.install_and_fetch(sector);
        }
        true
    }
}

impl CacheGuard<'_> {
    fn position(&self, sector: SectorId) -> Option<usize> {
        self.inner
            .entries
            .iter()
            .position(|entry| entry.sector == sector)
    }

    /// 安装新表项，必要时先淘汰最旧的一项；返回新表项的下标
    fn install(&mut self, sector: SectorId) -> usize {
        let data = if self.inner.entries.len() == self.cache.capacity {
            let victim = self.inner.entries.pop_front().unwrap();
            if victim.dirty {
                log::trace!("evict dirty sector {}", victim.sector);
                self.cache
                    .dev
                    .write_block(victim.sector.index(), &victim.data[..]);
            }
            // 缓冲区复用，旧内容由调用者负责覆盖
            victim.data
        } else {
            Box::new([0; SECTOR_SIZE])
        };

        self.inner.entries.push_back(CacheEntry {
            sector,
            data,
            dirty: false,
        });
        self.inner.entries.len() - 1
    }

    fn install_and_fetch(&mut self, sector: SectorId) -> usize {
        let index = self.install(sector);
        let entry = &mut self.inner.entries[index];
        self.cache.dev.read_block(entry.sector.index(), &mut entry.data[..]);
        index
    }
}
