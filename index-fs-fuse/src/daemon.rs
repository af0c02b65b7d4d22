use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use index_fs::SectorCache;

/// 扇区缓存的两项后台职责，各占一条std线程：
///
/// - 周期写回：每隔固定的墙钟间隔冲刷全部脏表项，
///   把突然断电的数据损失限制在一个间隔之内；
/// - 预读：认领缓存排入的待预读扇区。没活干就睡眠让出CPU，
///   不与前台I/O争抢。
///
/// 必须在缓存停机**之前**调用 [`CacheDaemons::stop`]，
/// 否则后台任务会与缓冲区的释放竞争。
pub struct CacheDaemons {
    stop: Arc<AtomicBool>,
    flusher: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl CacheDaemons {
    pub fn start(cache: Arc<SectorCache>, flush_interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let tick = Duration::from_millis(5).min(flush_interval);

        let flusher = {
            let cache = cache.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut since_flush = Duration::ZERO;
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(tick);
                    since_flush += tick;
                    if since_flush >= flush_interval {
                        cache.flush_all();
                        since_flush = Duration::ZERO;
                    }
                }
            })
        };

        let reader = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if !cache.read_ahead_once() {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        };

        Self {
            stop,
            flusher: Some(flusher),
            reader: Some(reader),
        }
    }

    /// 通知并汇合两条线程
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for CacheDaemons {
    fn drop(&mut self) {
        self.join();
    }
}
