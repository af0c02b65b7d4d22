//! # 存储子系统上下文
//!
//! [`IndexFileSystem`] 持有扇区缓存、注入的空闲位图
//! 与打开句柄注册表，生命周期有明确的构建与停机，
//! 不依赖任何文件作用域的单例。
//!
//! 注册表按扇区号去重：同一扇区的重复打开复用既有句柄并
//! 递增其引用计数，保证同一文件在内存中只有一份映射镜像。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::layout::InodeData;
use crate::Error;
use crate::FreeMap;
use crate::Inode;
use crate::SectorCache;
use crate::SectorId;

/// 锁序约定，全仓库一致：注册表 → 句柄状态 → 空闲位图 → 缓存
pub struct IndexFileSystem {
    pub(crate) cache: Arc<SectorCache>,
    pub(crate) free_map: Mutex<Box<dyn FreeMap>>,
    pub(crate) open_inodes: Mutex<Vec<Arc<Inode>>>,
}

impl IndexFileSystem {
    pub fn new(
        dev: Arc<dyn BlockDevice>,
        free_map: Box<dyn FreeMap>,
        cache_capacity: usize,
        sector_count: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache: Arc::new(SectorCache::new(dev, cache_capacity, sector_count)),
            free_map: Mutex::new(free_map),
            open_inodes: Mutex::new(Vec::new()),
        })
    }

    /// 在 `sector` 处建立长度为 `length` 的新文件映射。
    ///
    /// `sector` 自身（直接节点的栖身之处）由目录层事先分配。
    /// 整个建立过程只取一次缓存锁，不会与别的分配交错。
    pub fn create(&self, sector: SectorId, length: u32) -> Result<(), Error> {
        let mut free_map = self.free_map.lock();
        let mut cache = self.cache.lock();
        InodeData::create(&mut cache, free_map.as_mut(), sector, length)?;
        Ok(())
    }

    /// 打开 `sector` 处的文件映射。
    ///
    /// 已打开时复用既有句柄（引用计数加一），
    /// 否则物化映射镜像并登记新句柄。
    pub fn open(self: &Arc<Self>, sector: SectorId) -> Result<Arc<Inode>, Error> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.iter().find(|inode| inode.inumber() == sector) {
            inode.reopen();
            return Ok(inode.clone());
        }

        let mut cache = self.cache.lock();
        let data = InodeData::open(&mut cache, sector)?;
        drop(cache);

        let inode = Arc::new(Inode::new(sector, self.clone(), data));
        open_inodes.push(inode.clone());

        Ok(inode)
    }

    pub fn cache(&self) -> &Arc<SectorCache> {
        &self.cache
    }

    /// 替上层（目录层）向空闲位图要 `count` 个连续扇区，
    /// 典型用途是给新文件的直接节点找栖身之处
    pub fn allocate_sectors(&self, count: usize) -> Option<SectorId> {
        self.free_map.lock().allocate(count)
    }

    pub fn release_sectors(&self, sector: SectorId, count: usize) {
        self.free_map.lock().release(sector, count);
    }

    /// 注册表中打开句柄的个数
    pub fn open_inode_count(&self) -> usize {
        self.open_inodes.lock().len()
    }

    /// 停机：冲刷并丢弃全部缓存。
    /// 调用者须先停掉驱动周期写回与预读的线程。
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}
