//! 块映射树的节点
//!
//! - 直接节点：文件长度、D个数据扇区指针、一级间接指针、二级间接指针
//! - 间接节点：D个扇区指针；既用作一级间接节点，
//!   也用作二级间接的父节点（此时指针指向子间接节点）与子节点
//!
//! 每个节点恰好一个扇区。节点显式地与扇区缓冲区互相编解码，
//! 不做内存叠放；指针一律小端32位。
//! 解码时校验魔数，失败返回 [`Error::Corrupted`]，
//! 在此之前绝不使用任何指针字段。

use crate::DataSector;
use crate::Error;
use crate::SECTOR_SIZE;
use crate::{MAGIC, NO_SECTOR};

/// 每扇区的32位字数
const SECTOR_WORDS: usize = SECTOR_SIZE / 4;

/// 每个节点的指针容量，即规格中的D：
/// 扇区除去长度、两个间接指针、魔数四个字段后剩余的字数
pub const NODE_POINTERS: usize = SECTOR_WORDS - 4;

/// 直接节点
///
/// 长度字段是整个映射的唯一长度记录，
/// 其一致性不变量：长度折算出的扇区数恰好等于已分配的扇区数。
#[derive(Debug, Clone)]
pub struct DirectNode {
    pub sectors: [u32; NODE_POINTERS],
    /// 文件长度（字节）
    pub length: u32,
    /// 一级间接节点所在扇区，[`NO_SECTOR`] 表示没有
    pub indirect: u32,
    /// 二级间接父节点所在扇区，[`NO_SECTOR`] 表示没有
    pub doubly_indirect: u32,
    magic: u32,
}

/// 间接节点（一级、父、子共用）
///
/// 指针数与直接节点同为D，多出的3个字编码时补零、解码时忽略。
#[derive(Debug, Clone)]
pub struct IndirectNode {
    pub sectors: [u32; NODE_POINTERS],
    magic: u32,
}

impl DirectNode {
    pub fn new() -> Self {
        Self {
            sectors: [NO_SECTOR; NODE_POINTERS],
            length: 0,
            indirect: NO_SECTOR,
            doubly_indirect: NO_SECTOR,
            magic: MAGIC,
        }
    }

    /// 从扇区缓冲区解码并校验魔数
    pub fn decode(buf: &DataSector) -> Result<Self, Error> {
        let mut node = Self::new();
        read_words(buf, &mut node.sectors);
        node.length = read_word(buf, NODE_POINTERS);
        node.indirect = read_word(buf, NODE_POINTERS + 1);
        node.doubly_indirect = read_word(buf, NODE_POINTERS + 2);
        node.magic = read_word(buf, NODE_POINTERS + 3);

        if node.magic != MAGIC {
            return Err(Error::Corrupted);
        }
        Ok(node)
    }

    pub fn encode(&self, buf: &mut DataSector) {
        write_words(buf, &self.sectors);
        write_word(buf, NODE_POINTERS, self.length);
        write_word(buf, NODE_POINTERS + 1, self.indirect);
        write_word(buf, NODE_POINTERS + 2, self.doubly_indirect);
        write_word(buf, NODE_POINTERS + 3, self.magic);
    }
}

impl IndirectNode {
    pub fn new() -> Self {
        Self {
            sectors: [NO_SECTOR; NODE_POINTERS],
            magic: MAGIC,
        }
    }

    pub fn decode(buf: &DataSector) -> Result<Self, Error> {
        let mut node = Self::new();
        read_words(buf, &mut node.sectors);
        node.magic = read_word(buf, NODE_POINTERS);

        if node.magic != MAGIC {
            return Err(Error::Corrupted);
        }
        Ok(node)
    }

    pub fn encode(&self, buf: &mut DataSector) {
        write_words(buf, &self.sectors);
        write_word(buf, NODE_POINTERS, self.magic);
        for word in NODE_POINTERS + 1..SECTOR_WORDS {
            write_word(buf, word, 0);
        }
    }
}

impl Default for DirectNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for IndirectNode {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn read_word(buf: &DataSector, word: usize) -> u32 {
    let at = word * 4;
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

#[inline]
fn write_word(buf: &mut DataSector, word: usize, value: u32) {
    let at = word * 4;
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_words(buf: &DataSector, words: &mut [u32; NODE_POINTERS]) {
    for (word, slot) in words.iter_mut().enumerate() {
        *slot = read_word(buf, word);
    }
}

fn write_words(buf: &mut DataSector, words: &[u32; NODE_POINTERS]) {
    for (word, value) in words.iter().enumerate() {
        write_word(buf, word, *value);
    }
}
