#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use certiwipe_engines::device_vault::DeviceVault;
use certiwipe_tools::cert_cli;
use certiwipe_tools::vault_cli::{execute_vault_command, parse_provider_secret_id};

const USAGE: &str = "usage: certiwipe <keygen|pubkey|sign|verify|summary|vault> ...
  certiwipe keygen <key_path>
  certiwipe pubkey <key_path>
  certiwipe sign <json_path> <key_path>
  certiwipe verify <json_path> <public_key_pem_path>
  certiwipe summary <json_path>
  certiwipe vault <set|has|del|ls> [key_id]";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().ok_or_else(|| USAGE.to_string())?;
    let arg = |idx: usize| path_arg(&args, idx);
    let output = match command.as_str() {
        "keygen" => cert_cli::keygen(arg(1)?)?,
        "pubkey" => cert_cli::pubkey(arg(1)?)?,
        "sign" => cert_cli::sign(arg(1)?, arg(2)?)?,
        "verify" => cert_cli::verify(arg(1)?, arg(2)?)?,
        "summary" => cert_cli::summary(arg(1)?)?,
        "vault" => run_vault(&args[1..])?,
        _ => return Err(USAGE.to_string()),
    };
    if !output.is_empty() {
        println!("{}", output.trim_end());
    }
    Ok(())
}

fn path_arg(args: &[String], idx: usize) -> Result<&Path, String> {
    args.get(idx)
        .map(Path::new)
        .ok_or_else(|| USAGE.to_string())
}

fn run_vault(args: &[String]) -> Result<String, String> {
    let subcommand = args
        .first()
        .ok_or_else(|| "usage: certiwipe vault <set|has|del|ls> [key_id]".to_string())?
        .as_str();
    let key_id = args.get(1).map(String::as_str);
    let value = if subcommand == "set" {
        let key = key_id.ok_or_else(|| "usage: certiwipe vault set <key_id>".to_string())?;
        let parsed = parse_provider_secret_id(key)?;
        Some(read_secret_value(parsed.as_str())?)
    } else {
        None
    };

    let vault = DeviceVault::default_local();
    execute_vault_command(&vault, subcommand, key_id, value.as_deref())
}

fn read_secret_value(key_id: &str) -> Result<String, String> {
    let value = if io::stdin().is_terminal() {
        rpassword::prompt_password(format!("Enter value for {key_id}:"))
            .map_err(|e| e.to_string())?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        input
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("secret value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}
