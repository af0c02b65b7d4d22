//! # index-fs
//!
//! 单磁盘的索引式存储引擎，自上而下分为三层：
//! 打开文件层（[`Inode`]）、索引分配层（[`InodeData`]）、
//! 扇区缓存层（[`SectorCache`]）。
//! 目录层、空闲位图、进程调度都不在本仓库内，
//! 以外部协作者的身份通过特质注入。

#![no_std]

extern crate alloc;

use derive_more::{Add, Display, From, Into};

// 打开文件层：引用计数的打开句柄，按字节区间读写
mod vfs;
pub use vfs::Inode;

// 存储子系统上下文：持有缓存、空闲位图与打开句柄注册表
mod ifs;
pub use ifs::IndexFileSystem;

// 磁盘数据结构层：块映射树的节点与索引分配逻辑
pub mod layout;
pub use layout::InodeData;

// 扇区缓存层：内存上的磁盘扇区数据缓存
mod sector_cache;
pub use sector_cache::{CacheGuard, SectorCache};

// 空闲位图接口层
mod free_map;
pub use free_map::FreeMap;

mod error;
pub use error::Error;

/// 节点魔数，"INOD"
pub const MAGIC: u32 = 0x494e_4f44;
pub const SECTOR_SIZE: usize = 512;

/// 一个扇区的数据
pub type DataSector = [u8; SECTOR_SIZE];

/// 扇区号
///
/// 块映射树的磁盘指针恒为32位，因此不用usize。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Add, Display, From, Into,
)]
#[repr(transparent)]
pub struct SectorId(u32);

/// 磁盘指针的空值，占据了最大的扇区号
pub const NO_SECTOR: u32 = u32::MAX;

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// 拉伸扇区号至设备的块ID
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl core::ops::Add<u32> for SectorId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
