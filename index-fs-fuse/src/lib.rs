//! index-fs 的宿主侧工具：文件充当块设备、内存空闲位图、
//! 以及驱动缓存后台任务的std线程。


mod block_file;
mod daemon;
mod free_map;

pub use self::{block_file::BlockFile, daemon::CacheDaemons, free_map::BitFreeMap};
