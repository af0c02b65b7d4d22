use clap::Parser;
use std::path::PathBuf;

/// 把宿主机文件打进一个 index-fs 磁盘镜像。
/// 没有目录层，每个文件占据一个裸inode，按打包顺序报告扇区号。
#[derive(Parser)]
pub struct Cli {
    /// Files to pack into the image
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output directory
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,
}
