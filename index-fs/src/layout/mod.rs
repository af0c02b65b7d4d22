//! # 磁盘数据结构层
//!
//! 文件的块映射树：直接节点、一级间接节点、二级间接的父节点，
//! 每个节点恰好占一个扇区，见 [`node`]；
//! 以及把字节偏移翻译成扇区号、负责在线扩展的索引分配逻辑，
//! 见 [`inode_data`]。

pub mod node;
pub use node::{DirectNode, IndirectNode, NODE_POINTERS};

mod inode_data;
pub use inode_data::{InodeData, MAX_LENGTH};
