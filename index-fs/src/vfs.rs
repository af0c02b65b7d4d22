//! # 打开文件层
//!
//! [`Inode`] 是文件的打开句柄：引用计数的打开、延迟到最后一次
//! 关闭的删除、写禁止计数，以及跨越扇区边界的字节区间读写。
//!
//! 句柄状态机：打开（open_cnt ≥ 1）→ 关闭中（归零）→
//! 已标记删除则归还存储，否则冲刷镜像后释放。

use alloc::sync::Arc;

use spin::Mutex;

use crate::layout::InodeData;
use crate::sector_cache::CacheGuard;
use crate::Error;
use crate::IndexFileSystem;
use crate::SectorId;
use crate::SECTOR_SIZE;

pub struct Inode {
    /// 直接节点所在扇区，亦即文件的编号
    sector: SectorId,
    fs: Arc<IndexFileSystem>,
    state: Mutex<InodeState>,
}

struct InodeState {
    /// 打开计数
    open_cnt: usize,
    /// 是否已标记删除；真正的回收推迟到最后一次关闭
    removed: bool,
    /// 0表示可写，正数表示有这么多打开者禁止了写入
    deny_write_cnt: usize,
    /// 块映射树的内存镜像，本句柄独占
    data: InodeData,
}

impl Inode {
    pub(crate) fn new(sector: SectorId, fs: Arc<IndexFileSystem>, data: InodeData) -> Self {
        Self {
            sector,
            fs,
            state: Mutex::new(InodeState {
                open_cnt: 1,
                removed: false,
                deny_write_cnt: 0,
                data,
            }),
        }
    }

    pub(crate) fn reopen(&self) {
        self.state.lock().open_cnt += 1;
    }

    /// 文件的编号，即直接节点所在扇区
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    /// 文件长度（字节）
    pub fn length(&self) -> usize {
        self.state.lock().data.length() as usize
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_cnt
    }

    /// 从 `offset` 起读出至多 `buf.len()` 个字节，返回实际读到的字节数；
    /// 到达文件末尾时提前结束。
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let state = self.state.lock();
        let mut cache = self.fs.cache.lock();

        let end = (offset + buf.len()).min(state.data.length() as usize);
        let mut start = offset;
        let mut read = 0;

        while start < end {
            let Some(sector) = state.data.byte_to_sector(start) else {
                break;
            };
            let sector_ofs = start % SECTOR_SIZE;
            let chunk = (end - start).min(SECTOR_SIZE - sector_ofs);

            cache.read(sector);
            let cached = cache.get_buffer(sector);
            buf[read..read + chunk].copy_from_slice(&cached[sector_ofs..sector_ofs + chunk]);

            start += chunk;
            read += chunk;
        }

        read
    }

    /// 从 `offset` 起写入 `buf`，返回实际写入的字节数。
    ///
    /// 写入越过文件末尾时先扩展映射，扩展成功后立即把更新过的
    /// 映射节点冲刷进缓存，新长度与新指针由此进入周期写回的视野。
    /// 扩展失败不是崩溃，旧长度以内的部分照常写入，
    /// 调用者会观察到少于请求的字节数。
    /// 写禁止计数为正时定义为写入0字节。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut state = self.state.lock();

        if state.deny_write_cnt > 0 {
            return 0;
        }

        let end = offset + buf.len();
        if end > state.data.length() as usize {
            let mut free_map = self.fs.free_map.lock();
            let mut cache = self.fs.cache.lock();

            // 扩展量塞不进u32的写入请求必然超出三级索引的容量
            let grown = u32::try_from(end - state.data.length() as usize)
                .map_err(|_| Error::TooLarge)
                .and_then(|deficit| state.data.extend(&mut cache, free_map.as_mut(), deficit));
            match grown {
                Ok(()) => state.data.flush(&mut cache, self.sector),
                Err(err) => {
                    log::warn!("inode {}: extend to {end} bytes failed: {err:?}", self.sector);
                }
            }
            drop(free_map);
            write_chunks(&state.data, &mut cache, offset, buf)
        } else {
            let mut cache = self.fs.cache.lock();
            write_chunks(&state.data, &mut cache, offset, buf)
        }
    }

    /// 关闭句柄。最后一名打开者离开时注销注册表项，
    /// 已标记删除则连同直接节点自身的扇区一起归还存储，
    /// 否则把映射镜像冲刷回缓存。
    pub fn close(&self) {
        let mut open_inodes = self.fs.open_inodes.lock();
        let mut state = self.state.lock();

        state.open_cnt -= 1;
        if state.open_cnt > 0 {
            return;
        }

        open_inodes.retain(|inode| inode.sector != self.sector);
        drop(open_inodes);

        if state.removed {
            let mut free_map = self.fs.free_map.lock();
            state.data.release(free_map.as_mut());
            free_map.release(self.sector, 1);
        } else {
            let mut cache = self.fs.cache.lock();
            state.data.flush(&mut cache, self.sector);
        }
    }

    /// 标记删除；存储的回收推迟到最后一次 [`Inode::close`]
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    /// 禁止写入。每名打开者至多调用一次。
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_cnt += 1;
        assert!(state.deny_write_cnt <= state.open_cnt);
    }

    /// 重新允许写入。每名调用过 [`Inode::deny_write`] 的打开者
    /// 必须在关闭前调用一次。
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_cnt > 0);
        assert!(state.deny_write_cnt <= state.open_cnt);
        state.deny_write_cnt -= 1;
    }
}

fn write_chunks(data: &InodeData, cache: &mut CacheGuard, offset: usize, buf: &[u8]) -> usize {
    let end = (offset + buf.len()).min(data.length() as usize);
    let mut start = offset;
    let mut written = 0;

    while start < end {
        let Some(sector) = data.byte_to_sector(start) else {
            break;
        };
        let sector_ofs = start % SECTOR_SIZE;
        let chunk = (end - start).min(SECTOR_SIZE - sector_ofs);

        // 整扇区覆盖就不必读设备，缓冲区直接清零；
        // 只动部分字节则先把扇区读进来，保住未触碰的字节
        if sector_ofs == 0 && chunk == SECTOR_SIZE {
            cache.get_buffer(sector).fill(0);
        } else {
            cache.read(sector);
        }

        let cached = cache.get_buffer(sector);
        cached[sector_ofs..sector_ofs + chunk].copy_from_slice(&buf[written..written + chunk]);
        cache.write(sector);

        start += chunk;
        written += chunk;
    }

    written
}
