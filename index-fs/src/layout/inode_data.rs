//! # 索引分配层
//!
//! [`InodeData`] 是一份文件块映射树的内存镜像：打开时一次性物化，
//! 之后字节偏移到扇区号的翻译纯粹在内存中完成，
//! 长度变化与最终关闭时再经由扇区缓存冲刷回磁盘。
//!
//! ## 逻辑块编码
//!
//! 0起始的逻辑块索引 i：
//! - i < D 走直接指针
//! - D ≤ i < 2D 走一级间接节点的第 i−D 项
//! - 其余取 j = i−2D，走父节点第 j/D 项所指子节点的第 j%D 项

use alloc::vec::Vec;

use crate::sector_cache::CacheGuard;
use crate::Error;
use crate::FreeMap;
use crate::SectorId;
use crate::NO_SECTOR;
use crate::SECTOR_SIZE;

use super::node::{DirectNode, IndirectNode, NODE_POINTERS};

/// 三级索引的容量上限（字节）
pub const MAX_LENGTH: u32 =
    ((2 * NODE_POINTERS + NODE_POINTERS * NODE_POINTERS) * SECTOR_SIZE) as u32;

/// 文件块映射树的内存镜像
///
/// 由打开它的 [`Inode`](crate::Inode) 独占；
/// 同一扇区不会同时存在两份镜像（打开句柄注册表保证）。
#[derive(Debug)]
pub struct InodeData {
    direct: DirectNode,
    indirect: Option<IndirectNode>,
    /// 二级间接的父节点
    parent: Option<IndirectNode>,
    /// 每个被占用的父槽位对应一个子间接节点
    children: Vec<IndirectNode>,
}

/// 指定长度在三个层级各需要多少个**数据扇区**
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectorCounts {
    direct: usize,
    indirect: usize,
    doubly: usize,
}

impl SectorCounts {
    fn from_length(length: u32) -> Self {
        let mut left = (length as usize).div_ceil(SECTOR_SIZE);

        let direct = left.min(NODE_POINTERS);
        left -= direct;
        let indirect = left.min(NODE_POINTERS);
        left -= indirect;

        Self {
            direct,
            indirect,
            doubly: left,
        }
    }

    /// 二级间接需要的子节点个数
    fn children(&self) -> usize {
        self.doubly.div_ceil(NODE_POINTERS)
    }
}

impl InodeData {
    /// 建立一份长度为 `length` 的新映射并持久化到 `sector`。
    ///
    /// 所有数据扇区会被零填充，直接、间接、父、子各节点
    /// 都会写入缓存。空闲位图耗尽时返回 [`Error::DiskFull`]，
    /// 本次已分配的扇区全部归还。
    pub fn create(
        cache: &mut CacheGuard,
        free_map: &mut dyn FreeMap,
        sector: SectorId,
        length: u32,
    ) -> Result<Self, Error> {
        let mut data = Self {
            direct: DirectNode::new(),
            indirect: None,
            parent: None,
            children: Vec::new(),
        };
        data.extend(cache, free_map, length)?;
        data.flush(cache, sector);

        Ok(data)
    }

    /// 从 `sector` 读出直接节点并物化整棵映射树。
    ///
    /// 每个节点先经魔数校验再使用其指针；
    /// 校验失败视作磁盘损坏，返回 [`Error::Corrupted`]。
    pub fn open(cache: &mut CacheGuard, sector: SectorId) -> Result<Self, Error> {
        cache.read(sector);
        let direct = DirectNode::decode(cache.get_buffer(sector))?;
        let counts = SectorCounts::from_length(direct.length);

        let mut data = Self {
            direct,
            indirect: None,
            parent: None,
            children: Vec::new(),
        };

        if counts.indirect > 0 {
            let at = pointer(data.direct.indirect)?;
            cache.read(at);
            data.indirect = Some(IndirectNode::decode(cache.get_buffer(at))?);
        }

        if counts.doubly > 0 {
            let at = pointer(data.direct.doubly_indirect)?;
            cache.read(at);
            let parent = IndirectNode::decode(cache.get_buffer(at))?;

            for slot in 0..counts.children() {
                let at = pointer(parent.sectors[slot])?;
                cache.read(at);
                data.children.push(IndirectNode::decode(cache.get_buffer(at))?);
            }
            data.parent = Some(parent);
        }

        Ok(data)
    }

    /// 映射覆盖的字节数
    pub fn length(&self) -> u32 {
        self.direct.length
    }

    /// 把字节偏移翻译成扇区号；偏移不小于长度时返回 `None`。
    ///
    /// 纯函数，只查内存镜像，不触碰缓存。
    pub fn byte_to_sector(&self, pos: usize) -> Option<SectorId> {
        if pos >= self.direct.length as usize {
            return None;
        }

        let index = pos / SECTOR_SIZE;
        let raw = if index < NODE_POINTERS {
            self.direct.sectors[index]
        } else if index < 2 * NODE_POINTERS {
            self.indirect.as_ref()?.sectors[index - NODE_POINTERS]
        } else {
            let index = index - 2 * NODE_POINTERS;
            self.children.get(index / NODE_POINTERS)?.sectors[index % NODE_POINTERS]
        };

        (raw != NO_SECTOR).then(|| SectorId::new(raw))
    }

    /// 把映射扩展 `additional` 个字节。
    ///
    /// 先一次性取得本次需要的全部扇区（数据扇区加上跨越层级边界
    /// 产生的新节点扇区），再逐层落位并零填充新数据扇区，
    /// 最后才提交新长度——长度绝不虚报没有扇区支撑的字节。
    /// 任何一步分配失败都会放弃本次扩展并归还已得扇区。
    pub fn extend(
        &mut self,
        cache: &mut CacheGuard,
        free_map: &mut dyn FreeMap,
        additional: u32,
    ) -> Result<(), Error> {
        if additional == 0 {
            return Ok(());
        }

        let old_length = self.direct.length;
        let new_length = old_length
            .checked_add(additional)
            .filter(|length| *length <= MAX_LENGTH)
            .ok_or(Error::TooLarge)?;

        let old = SectorCounts::from_length(old_length);
        let new = SectorCounts::from_length(new_length);

        let mut needed =
            (new.direct - old.direct) + (new.indirect - old.indirect) + (new.doubly - old.doubly);
        if new.indirect > 0 && self.indirect.is_none() {
            needed += 1;
        }
        if new.doubly > 0 && self.parent.is_none() {
            needed += 1;
        }
        needed += new.children() - old.children();

        let mut fresh = Vec::with_capacity(needed);
        for _ in 0..needed {
            match free_map.allocate(1) {
                Some(sector) => fresh.push(sector),
                None => {
                    log::warn!(
                        "extend by {additional} bytes failed, {} of {needed} sectors allocated",
                        fresh.len()
                    );
                    for sector in fresh {
                        free_map.release(sector, 1);
                    }
                    return Err(Error::DiskFull);
                }
            }
        }
        let mut fresh = fresh.into_iter();

        /* 直接层 */
        for slot in old.direct..new.direct {
            let sector = fresh.next().unwrap();
            self.direct.sectors[slot] = sector.get();
            zero_data_sector(cache, sector);
        }

        /* 一级间接层 */
        if new.indirect > 0 {
            // 这次扩展经过了D，建立一级间接节点
            if self.indirect.is_none() {
                self.direct.indirect = fresh.next().unwrap().get();
                self.indirect = Some(IndirectNode::new());
            }

            let node = self.indirect.as_mut().unwrap();
            for slot in old.indirect..new.indirect {
                let sector = fresh.next().unwrap();
                node.sectors[slot] = sector.get();
                zero_data_sector(cache, sector);
            }
        }

        /* 二级间接层 */
        if new.doubly > 0 {
            // 这次扩展经过了2D，建立父节点
            if self.parent.is_none() {
                self.direct.doubly_indirect = fresh.next().unwrap().get();
                self.parent = Some(IndirectNode::new());
            }

            for slot in old.children()..new.children() {
                self.parent.as_mut().unwrap().sectors[slot] = fresh.next().unwrap().get();
                self.children.push(IndirectNode::new());
            }

            for index in old.doubly..new.doubly {
                let sector = fresh.next().unwrap();
                self.children[index / NODE_POINTERS].sectors[index % NODE_POINTERS] =
                    sector.get();
                zero_data_sector(cache, sector);
            }
        }

        debug_assert!(fresh.next().is_none());

        self.direct.length = new_length;
        Ok(())
    }

    /// 把映射占用的每一个扇区归还空闲位图：
    /// 各层数据扇区、一级间接节点、父节点以及每个子节点。
    /// 只在文件被永久删除时调用一次；直接节点自身的扇区由调用者归还。
    pub fn release(&self, free_map: &mut dyn FreeMap) {
        let counts = SectorCounts::from_length(self.direct.length);

        for slot in 0..counts.direct {
            free_map.release(SectorId::new(self.direct.sectors[slot]), 1);
        }

        if let Some(node) = &self.indirect {
            for slot in 0..counts.indirect {
                free_map.release(SectorId::new(node.sectors[slot]), 1);
            }
            free_map.release(SectorId::new(self.direct.indirect), 1);
        }

        if let Some(parent) = &self.parent {
            for (slot, child) in self.children.iter().enumerate() {
                // 只有最后一个子节点可能未装满
                let used = if slot + 1 == counts.children() {
                    counts.doubly - slot * NODE_POINTERS
                } else {
                    NODE_POINTERS
                };
                for index in 0..used {
                    free_map.release(SectorId::new(child.sectors[index]), 1);
                }
                free_map.release(SectorId::new(parent.sectors[slot]), 1);
            }
            free_map.release(SectorId::new(self.direct.doubly_indirect), 1);
        }
    }

    /// 把直接节点写回 `sector`，存在的间接、父、子节点
    /// 也一并写回各自记录的扇区。用于把内存镜像与磁盘对账，
    /// 例如未删除文件的最后一次关闭。
    pub fn flush(&self, cache: &mut CacheGuard, sector: SectorId) {
        self.direct.encode(cache.get_buffer(sector));
        cache.write(sector);

        if let Some(node) = &self.indirect {
            let at = SectorId::new(self.direct.indirect);
            node.encode(cache.get_buffer(at));
            cache.write(at);
        }

        if let Some(parent) = &self.parent {
            let at = SectorId::new(self.direct.doubly_indirect);
            parent.encode(cache.get_buffer(at));
            cache.write(at);

            for (slot, child) in self.children.iter().enumerate() {
                let at = SectorId::new(parent.sectors[slot]);
                child.encode(cache.get_buffer(at));
                cache.write(at);
            }
        }
    }
}

/// 校验过魔数的节点，其在用指针仍可能是空值——那就是损坏
fn pointer(raw: u32) -> Result<SectorId, Error> {
    if raw == NO_SECTOR {
        return Err(Error::Corrupted);
    }
    Ok(SectorId::new(raw))
}

/// 新分配的数据扇区一律零填充；
/// 表项刚由 `get_buffer` 安装，不会触发多余的设备读取
fn zero_data_sector(cache: &mut CacheGuard, sector: SectorId) {
    cache.get_buffer(sector).fill(0);
    cache.write(sector);
}
