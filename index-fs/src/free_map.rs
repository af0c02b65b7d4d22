//! 空闲位图接口层
//!
//! 空闲扇区的分配与回收不属于本仓库，
//! 由外部在构建 [`IndexFileSystem`](crate::IndexFileSystem) 时注入。

use crate::SectorId;

/// 空闲位图特质
pub trait FreeMap: Send {
    /// 分配 `count` 个连续扇区，返回首扇区号；
    /// 空间不足时返回 `None`，不产生副作用。
    fn allocate(&mut self, count: usize) -> Option<SectorId>;

    /// 归还自 `sector` 起的 `count` 个扇区
    fn release(&mut self, sector: SectorId, count: usize);
}
