//! 测试公用的内存盘与空闲位图
#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use index_fs::{FreeMap, IndexFileSystem, SectorId, SECTOR_SIZE};

/// 内存里的块设备，顺带统计设备级读写次数
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemDisk {
    pub fn new(sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(vec![0; sectors * SECTOR_SIZE]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// 绕过缓存直接窥视设备上的扇区内容
    pub fn raw_sector(&self, sector: usize) -> [u8; SECTOR_SIZE] {
        let data = self.data.lock().unwrap();
        let at = sector * SECTOR_SIZE;
        data[at..at + SECTOR_SIZE].try_into().unwrap()
    }

    /// 绕过缓存直接改写设备上的扇区内容
    pub fn poke_sector(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) {
        let mut data = self.data.lock().unwrap();
        let at = sector * SECTOR_SIZE;
        data[at..at + SECTOR_SIZE].copy_from_slice(buf);
    }
}

impl fmt::Debug for MemDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemDisk")
            .field("sectors", &(self.data.lock().unwrap().len() / SECTOR_SIZE))
            .finish()
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let data = self.data.lock().unwrap();
        let at = block_id * SECTOR_SIZE;
        buf.copy_from_slice(&data[at..at + SECTOR_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut data = self.data.lock().unwrap();
        let at = block_id * SECTOR_SIZE;
        data[at..at + SECTOR_SIZE].copy_from_slice(buf);
    }
}

/// 可克隆的空闲位图：测试持有一个克隆，
/// 就能在位图交给文件系统之后继续观察空闲扇区数
#[derive(Debug, Clone)]
pub struct SharedFreeMap {
    used: Arc<Mutex<Vec<bool>>>,
}

impl SharedFreeMap {
    pub fn new(sectors: usize, reserved: usize) -> Self {
        let mut used = vec![false; sectors];
        used[..reserved].fill(true);
        Self {
            used: Arc::new(Mutex::new(used)),
        }
    }

    pub fn free_count(&self) -> usize {
        self.used.lock().unwrap().iter().filter(|used| !**used).count()
    }
}

impl FreeMap for SharedFreeMap {
    fn allocate(&mut self, count: usize) -> Option<SectorId> {
        let mut used = self.used.lock().unwrap();
        let mut run = 0;
        for sector in 0..used.len() {
            if used[sector] {
                run = 0;
                continue;
            }

            run += 1;
            if run == count {
                let first = sector + 1 - count;
                used[first..=sector].fill(true);
                return Some(SectorId::new(first as u32));
            }
        }
        None
    }

    fn release(&mut self, sector: SectorId, count: usize) {
        let mut used = self.used.lock().unwrap();
        for freed in sector.index()..sector.index() + count {
            assert!(used[freed], "double release of sector {freed}");
            used[freed] = false;
        }
    }
}

/// 组装一整套文件系统，返回上下文、内存盘与位图的观察克隆
pub fn setup(
    sectors: usize,
    capacity: usize,
    reserved: usize,
) -> (Arc<IndexFileSystem>, Arc<MemDisk>, SharedFreeMap) {
    let disk = MemDisk::new(sectors);
    let free_map = SharedFreeMap::new(sectors, reserved);
    let fs = IndexFileSystem::new(
        disk.clone() as Arc<dyn BlockDevice>,
        Box::new(free_map.clone()),
        capacity,
        sectors,
    );
    (fs, disk, free_map)
}
