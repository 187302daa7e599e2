mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use colored::*;
use log::{error, info};
use std::process::ExitCode;

use wx4vault::batch::{decrypt_batch, scan, BatchOptions, OnFileDone, OnFileProgress};
use wx4vault::db::{decrypt_database, get_database_info, validate_key, DecryptOptions, OnPageProgress};
use wx4vault::image::{auto_decrypt, detect_version, detect_xor_key, ImageVersion};
use wx4vault::MasterKey;

const BANNER: &str = r"
 ██╗    ██╗██╗  ██╗██╗  ██╗
 ██║    ██║╚██╗██╔╝██║  ██║
 ██║ █╗ ██║ ╚███╔╝ ███████║
 ██║███╗██║ ██╔██╗ ╚════██║
 ╚███╔███╔╝██╔╝ ██╗     ██║
  ╚══╝╚══╝ ╚═╝  ╚═╝     ╚═╝
";

struct ConsolePageProgress;
impl OnPageProgress for ConsolePageProgress {
    fn on_page(&self, current: u32, total: u32) {
        println!("  page {current}/{total}");
    }
}

struct ConsoleFileProgress;
impl OnFileProgress for ConsoleFileProgress {
    fn on_file_progress(&self, relative_path: &str, current: u32, total: u32) {
        println!("  {relative_path}: page {current}/{total}");
    }
}

struct ConsoleFileDone;
impl OnFileDone for ConsoleFileDone {
    fn on_file_done(&self, relative_path: &str, success: bool) {
        if success {
            println!("[+] {relative_path}");
        } else {
            println!("[-] {relative_path}");
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    println!("{}", BANNER.cyan());
    println!(
        "{}",
        format!(" wx4vault v{} ", env!("CARGO_PKG_VERSION"))
            .cyan()
            .on_black()
    );

    let result = run(cli.command);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{}", format!("error: {e}").red());
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Db {
            input,
            output,
            key,
            skip_validation,
            quiet,
        } => {
            info!("decrypting {}", input.display());
            let master_key = MasterKey::from_hex(&key)?;
            let progress: Option<&dyn OnPageProgress> = if quiet {
                None
            } else {
                Some(&ConsolePageProgress)
            };
            let stats = decrypt_database(
                &input,
                &output,
                &master_key,
                DecryptOptions {
                    skip_validation,
                    progress,
                },
            )?;
            println!(
                "decrypted {} pages ({} bytes) -> {}",
                stats.pages_written,
                stats.bytes_written,
                output.display()
            );
            Ok(())
        }

        Commands::Validate { input, key } => {
            let master_key = MasterKey::from_hex(&key)?;
            let ok = validate_key(&input, &master_key)?;
            println!("key valid: {ok}");
            if !ok {
                anyhow::bail!("key does not validate against {}", input.display());
            }
            Ok(())
        }

        Commands::Info { input } => {
            let info = get_database_info(&input)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }

        Commands::Batch {
            input,
            output,
            key,
            parallel,
            skip_validation,
            scan_only,
            quiet,
        } => {
            let master_key = MasterKey::from_hex(&key)?;
            if scan_only {
                let entries = scan(&input)?;
                for entry in &entries {
                    println!("{} ({} bytes)", entry.relative_path, entry.size_bytes);
                }
                return Ok(());
            }

            let file_progress: Option<&dyn OnFileProgress> = if quiet {
                None
            } else {
                Some(&ConsoleFileProgress)
            };
            let file_done: Option<&dyn OnFileDone> = if quiet {
                None
            } else {
                Some(&ConsoleFileDone)
            };

            let report = decrypt_batch(
                &input,
                &output,
                &master_key,
                BatchOptions {
                    workers: parallel,
                    skip_validation,
                    scan_only: false,
                    on_file_progress: file_progress,
                    on_file_done: file_done,
                },
            )?;

            println!(
                "{} succeeded, {} failed",
                report.successes.len(),
                report.failures.len()
            );
            for failure in &report.failures {
                println!("  [-] {}: {} ({})", failure.relative_path, failure.message, failure.error_kind);
            }
            if !report.failures.is_empty() {
                anyhow::bail!("{} file(s) failed to decrypt", report.failures.len());
            }
            Ok(())
        }

        Commands::Image {
            input,
            output,
            xor_key,
            aes_key,
        } => {
            let xor_key = match xor_key {
                Some(hex_key) => u8::from_str_radix(hex_key.trim_start_matches("0x"), 16)?,
                None => detect_xor_key(&input)?
                    .ok_or_else(|| anyhow::anyhow!("could not auto-detect XOR key for {}", input.display()))?,
            };

            let aes_key_bytes = match aes_key {
                Some(hex_key) => {
                    let bytes = hex::decode(&hex_key)?;
                    let mut arr = [0u8; 16];
                    if bytes.len() != 16 {
                        anyhow::bail!("AES key must be 16 bytes (32 hex characters)");
                    }
                    arr.copy_from_slice(&bytes);
                    Some(arr)
                }
                None => None,
            };

            let version = auto_decrypt(&input, &output, xor_key, aes_key_bytes.as_ref())?;
            println!("decrypted {:?} image -> {}", version, output.display());
            Ok(())
        }

        Commands::Detect { input } => {
            let data = std::fs::read(&input)?;
            let version = detect_version(&data);
            println!("version: {version:?}");
            if matches!(version, ImageVersion::V3) {
                match detect_xor_key(&input)? {
                    Some(key) => println!("xor key: {key:#04x}"),
                    None => println!("xor key: could not be determined"),
                }
            }
            Ok(())
        }
    }
}
