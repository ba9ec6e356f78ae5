mod base32;
mod config;
mod database;
mod migration;
mod normalize;
mod qrcode;
mod totp;
mod uri;

use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use crate::base32::base32_encode;
use crate::config::load_settings;
use crate::database::{MigrationDatabase, MigrationEntry};
use crate::migration::{DecodeError, MigrationBatch, OtpRecord};
use crate::normalize::{Decoded, decode_base64_text, migration_data, normalize};
use crate::qrcode::read_migration_qr_from_file;
use crate::totp::Totp;
use crate::uri::provisioning_uri;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = env::args().collect::<Vec<_>>();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let settings = load_settings();

    match args[1].as_str() {
        "decode" => {
            let Some(input) = required_arg(&args, "decode <data|uri|image>") else {
                return Ok(());
            };
            let Some(batch) = load_batch(input)? else {
                return Ok(());
            };

            println!("📦 Migration batch {} of {} (version {}, id {})",
                     batch.batch_index + 1, batch.batch_size.max(1), batch.version, batch.batch_id);
            println!("================");

            for record in &batch.records {
                println!("🔑 {}", record.account);
                println!("   Issuer: {}", record.issuer);
                println!("   Type: {} | {} | {} digits",
                         record.kind.uri_name(), record.algorithm.uri_name(), record.digits.count());
                if settings.show_secrets {
                    println!("   Secret: {}", base32_encode(&record.secret));
                }
                println!();
            }
        }
        "uris" => {
            let Some(input) = required_arg(&args, "uris <data|uri|image>") else {
                return Ok(());
            };
            let Some(records) = load_records(input)? else {
                return Ok(());
            };

            for record in &records {
                println!("{}", provisioning_uri(record));
            }
        }
        "export" => {
            let Some(input) = required_arg(&args, "export <data|uri|image>") else {
                return Ok(());
            };
            let Some(records) = load_records(input)? else {
                return Ok(());
            };

            let entries = records.iter().map(MigrationEntry::from_record).collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        "codes" => {
            let Some(input) = required_arg(&args, "codes <data|uri|image>") else {
                return Ok(());
            };
            let Some(records) = load_records(input)? else {
                return Ok(());
            };

            for record in &records {
                match Totp::for_record(record) {
                    Ok(totp) => {
                        let code = totp.generate()?;
                        println!("🔑 {:30} | {} | {}",
                                 record.account, code, remaining_string(totp.time_remaining()));
                    }
                    Err(e) => eprintln!("⚠️  {}: {}", record.account, e),
                }
            }
        }
        "inspect" => {
            let Some(input) = required_arg(&args, "inspect <base64>") else {
                return Ok(());
            };

            match decode_base64_text(input) {
                Ok(Decoded::Text(text)) => println!("📝 Text: {}", text),
                Ok(Decoded::Bytes(bytes)) => println!("🔢 Bytes ({}): {:02x?}", bytes.len(), bytes),
                Err(e) => eprintln!("❌ Error decoding Base64: {}", e),
            }
        }
        "import" => {
            let Some(input) = required_arg(&args, "import <data|uri|image>") else {
                return Ok(());
            };
            let Some(records) = load_records(input)? else {
                return Ok(());
            };

            let db = MigrationDatabase::new(&settings.db_path)?;
            let mut added = 0;

            for record in &records {
                let entry = MigrationEntry::from_record(record);
                if db.add_entry(&entry)? {
                    added += 1;
                    println!("✅ Added: {}", entry.name);
                } else {
                    println!("⚠️  Skipped (already exists): {}", entry.name);
                }
            }

            println!("📥 Imported {} of {} entries", added, records.len());
        }
        "list" => {
            let db = MigrationDatabase::new(&settings.db_path)?;
            let entries = db.get_all_entries()?;

            if entries.is_empty() {
                println!("📭 No entries found");
                return Ok(());
            }

            println!("📋 Imported Entries:");
            println!("================");

            for entry in entries {
                println!("🔑 {}", entry.name);
                if let Some(issuer) = entry.issuer {
                    println!("   Issuer: {}", issuer);
                }
                if settings.show_secrets {
                    println!("   URI: {}", entry.uri);
                }
                println!("   Created: {}", entry.created_at);
                println!();
            }
        }
        "get" | "copy" => {
            let Some(name) = required_arg(&args, &format!("{} <name>", args[1])) else {
                return Ok(());
            };

            let db = MigrationDatabase::new(&settings.db_path)?;
            match db.get_entry_by_name(name)? {
                Some(entry) => {
                    let totp = match Totp::for_entry(&entry) {
                        Ok(totp) => totp,
                        Err(e) => {
                            eprintln!("❌ {}: {}", entry.name, e);
                            return Ok(());
                        }
                    };
                    let (code, remaining) = if entry.kind == "hotp" {
                        let code = totp.code_for_counter(entry.counter);
                        db.advance_counter(&entry.name)?;
                        (code, None)
                    } else {
                        (totp.generate()?, Some(totp.time_remaining()))
                    };

                    if args[1] == "copy" {
                        let mut clipboard = arboard::Clipboard::new()?;
                        clipboard.set_text(code)?;
                        println!("✅ Copied code for {}", entry.name);
                    } else {
                        match remaining {
                            Some(remaining) => println!("🔑 {} | Code: {} | Expires in: {}s",
                                                        entry.name, code, remaining),
                            None => println!("🔑 {} | Code: {} | Counter: {} (next: {})",
                                             entry.name, code, entry.counter, entry.counter + 1),
                        }
                    }
                }
                None => {
                    eprintln!("❌ Entry not found: {}", name);
                }
            }
        }
        "delete" => {
            let Some(name) = required_arg(&args, "delete <name>") else {
                return Ok(());
            };

            let db = MigrationDatabase::new(&settings.db_path)?;
            if db.delete_entry(name)? {
                println!("✅ Deleted entry: {}", name);
            } else {
                eprintln!("❌ Entry not found: {}", name);
            }
        }
        _ => {
            eprintln!("❌ Unknown command: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn required_arg<'a>(args: &'a [String], usage: &str) -> Option<&'a str> {
    let arg = args.get(2).map(String::as_str);
    if arg.is_none() {
        eprintln!("❌ Usage: otp-migration {}", usage);
    }
    arg
}

// Accepts an image path, an otpauth-migration:// URI, or the bare data parameter
fn payload_bytes(input: &str) -> anyhow::Result<Result<Vec<u8>, DecodeError>> {
    let text = if Path::new(input).is_file() {
        read_migration_qr_from_file(input)?
    } else {
        input.to_string()
    };

    Ok(normalize(&migration_data(&text)?))
}

// Decode errors are reported and leave the process running; anything else propagates.
fn load_records(input: &str) -> anyhow::Result<Option<Vec<OtpRecord>>> {
    let decoded = payload_bytes(input)?.and_then(|bytes| migration::decode(&bytes));
    Ok(report(decoded))
}

fn load_batch(input: &str) -> anyhow::Result<Option<MigrationBatch>> {
    let decoded = payload_bytes(input)?.and_then(|bytes| migration::decode_batch(&bytes));
    Ok(report(decoded))
}

fn report<T>(decoded: Result<T, DecodeError>) -> Option<T> {
    match decoded {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!("❌ Failed to decode migration payload: {}", e);
            None
        }
    }
}

fn remaining_string(remaining: u64) -> String {
    if env::var("NO_COLOR").is_ok() || remaining > 5u64 {
        remaining.to_string() + "s"
    } else {
        format!("\x1b[31m{}s\x1b[0m", remaining) // Red color for low time
    }
}

fn print_usage() {
    println!("🔐 OTP Migration Console");
    println!("Usage: otp-migration <command> [args]");
    println!();
    println!("Commands:");
    println!("  decode <input>                   Show the records in a migration payload");
    println!("  uris <input>                     Print an otpauth:// URI per record");
    println!("  export <input>                   Print the records as JSON");
    println!("  codes <input>                    Show current codes without importing");
    println!("  inspect <base64>                 Decode base64 as text, or bytes if not UTF-8");
    println!("  import <input>                   Store the records in the local vault");
    println!("  list                             List imported entries");
    println!("  get <name>                       Get the current code for an entry");
    println!("  copy <name>                      Copy the current code to the clipboard");
    println!("  delete <name>                    Delete an entry");
    println!();
    println!("<input> is a QR code image, an otpauth-migration://offline?data=... URI,");
    println!("or the data parameter on its own.");
    println!();
    println!("Configuration:");
    println!("  Create an `{}` file with the following structure:", config::CONFIG_FILE);
    println!("  {{");
    println!("    \"db_path\": \"otp-migration.db\",");
    println!("    \"show_secrets\": false");
    println!("  }}");
    println!();
    println!("Environment Variables (used when the file is absent):");
    println!("  OTP_MIGRATION_DB                 Vault database path");
    println!("  OTP_MIGRATION_SHOW_SECRETS       Print secrets and URIs (true/false)");
    println!("  RUST_LOG                         Log filter, e.g. debug");
    println!();
    println!("Examples:");
    println!("  otp-migration uris 'otpauth-migration://offline?data=CjkKCkhl...'");
    println!("  otp-migration import export.png");
    println!("  otp-migration get Example:username@example.com");
}
