#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲位图已耗尽
    DiskFull,
    /// 节点魔数校验失败，磁盘上的块映射树不可信
    Corrupted,
    /// 超出三级索引的编号容量
    TooLarge,
}
