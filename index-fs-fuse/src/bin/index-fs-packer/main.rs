mod cli;

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use block_dev::BlockDevice;
use clap::Parser;
use index_fs::{IndexFileSystem, SECTOR_SIZE};
use index_fs_fuse::{BitFreeMap, BlockFile, CacheDaemons};
use typed_bytesize::ByteSizeIec;

const CACHE_CAPACITY: usize = 64;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = cli::Cli::parse();

    let disk_size = ByteSizeIec::mib(8).0;
    let sector_count = disk_size as usize / SECTOR_SIZE;

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(cli.out_dir.join("fs.img"))?;
    fd.set_len(disk_size)?;

    log::info!("packing {} files into a {sector_count}-sector image", cli.files.len());

    let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile(Mutex::new(fd)));
    let fs = IndexFileSystem::new(
        dev,
        Box::new(BitFreeMap::new(sector_count, 0)),
        CACHE_CAPACITY,
        sector_count,
    );
    let daemons = CacheDaemons::start(fs.cache().clone(), Duration::from_secs(1));

    for path in &cli.files {
        let bytes = fs::read(path)?;

        let sector = fs.allocate_sectors(1).expect("image out of sectors");
        fs.create(sector, 0).expect("image out of sectors");

        let inode = fs.open(sector).expect("fresh inode must open");
        let written = inode.write_at(0, &bytes);
        assert_eq!(written, bytes.len(), "image too small for {}", path.display());
        inode.close();

        println!("{} -> inode sector {sector} ({written} bytes)", path.display());
    }

    daemons.stop();
    fs.shutdown();

    Ok(())
}
