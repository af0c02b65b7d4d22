use index_fs::{FreeMap, SectorId};

/// 内存中的空闲位图
///
/// 真实内核里空闲位图自己也要落盘；宿主工具与测试只需要内存版本。
/// 分配策略是最朴素的first-fit连续扫描。
#[derive(Debug, Clone)]
pub struct BitFreeMap {
    words: Vec<u64>,
    sectors: usize,
}

impl BitFreeMap {
    /// 建立覆盖 `sectors` 个扇区的位图，前 `reserved` 个标记为已占用
    pub fn new(sectors: usize, reserved: usize) -> Self {
        let mut map = Self {
            words: vec![0; sectors.div_ceil(64)],
            sectors,
        };
        for sector in 0..reserved {
            map.set(sector, true);
        }
        map
    }

    pub fn free_count(&self) -> usize {
        (0..self.sectors).filter(|sector| !self.get(*sector)).count()
    }

    fn get(&self, sector: usize) -> bool {
        self.words[sector / 64] & (1 << (sector % 64)) != 0
    }

    fn set(&mut self, sector: usize, used: bool) {
        if used {
            self.words[sector / 64] |= 1 << (sector % 64);
        } else {
            self.words[sector / 64] &= !(1 << (sector % 64));
        }
    }
}

impl FreeMap for BitFreeMap {
    fn allocate(&mut self, count: usize) -> Option<SectorId> {
        let mut run = 0;
        for sector in 0..self.sectors {
            if self.get(sector) {
                run = 0;
                continue;
            }

            run += 1;
            if run == count {
                let first = sector + 1 - count;
                for used in first..=sector {
                    self.set(used, true);
                }
                return Some(SectorId::new(first as u32));
            }
        }
        None
    }

    fn release(&mut self, sector: SectorId, count: usize) {
        for freed in sector.index()..sector.index() + count {
            debug_assert!(self.get(freed), "double release of sector {freed}");
            self.set(freed, false);
        }
    }
}
