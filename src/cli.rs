use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 解密单个微信V4数据库
    Db {
        /// 加密数据库路径
        #[arg(short, long)]
        input: PathBuf,

        /// 解密后数据库输出路径
        #[arg(short, long)]
        output: PathBuf,

        /// 密钥(64位十六进制字符串)
        #[arg(short, long)]
        key: String,

        /// 跳过第一页MAC校验(不建议)
        #[arg(long)]
        skip_validation: bool,

        /// 静默模式，不打印逐页进度
        #[arg(short, long)]
        quiet: bool,
    },

    /// 校验密钥是否能解密指定数据库
    Validate {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        key: String,
    },

    /// 查看数据库页面信息(无需密钥)
    Info {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// 批量解密目录下的所有微信数据库
    Batch {
        /// 加密数据库所在目录
        #[arg(short, long)]
        input: PathBuf,

        /// 解密输出目录(镜像目录结构)
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        key: String,

        /// 工作线程数，0表示顺序处理
        #[arg(long, default_value_t = 4)]
        parallel: usize,

        #[arg(long)]
        skip_validation: bool,

        /// 仅扫描，不解密
        #[arg(long)]
        scan_only: bool,

        #[arg(short, long)]
        quiet: bool,
    },

    /// 解密dat图片文件
    Image {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// 单字节XOR密钥(十六进制，如 7b)
        #[arg(long)]
        xor_key: Option<String>,

        /// AES-128密钥(32位十六进制字符串)，V4容器必需
        #[arg(long)]
        aes_key: Option<String>,
    },

    /// 探测dat文件版本及可能的XOR密钥
    Detect {
        #[arg(short, long)]
        input: PathBuf,
    },
}
