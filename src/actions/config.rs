#![allow(clippy::option_map_unit_fn)]
use crate::config::Config;
use crate::outln;
use crate::util::set_json_output;
use anyhow::Result;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

const ALL_KEYS: [&str; 14] = [
    "root",
    "name",
    "user",
    "bind",
    "proc",
    "sys",
    "dev",
    "dev_pts",
    "dev_shm",
    "resolv_conf",
    "path",
    "lock_dir",
    "log_file",
    "log_level",
];

fn path_str(path: &Path) -> String {
    path.to_str().unwrap_or("<error>").to_string()
}

pub fn config(config: &Config, keys: Option<Vec<String>>) -> Result<()> {
    let keys = keys.unwrap_or_else(|| ALL_KEYS.map(String::from).to_vec());
    let multi_line = keys.len() > 1;
    let sandbox = &config.sandbox;

    for key in keys {
        let (key, value) = match key.as_str() {
            "root" => ("root", path_str(&sandbox.root)),
            "name" => ("name", sandbox.name.clone()),
            "user" => ("user", sandbox.user.clone()),
            "bind" => (
                "bind",
                sandbox
                    .bind_dirs
                    .iter()
                    .map(|dir| path_str(dir))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            "proc" => ("proc", sandbox.special.proc.to_string()),
            "sys" => ("sys", sandbox.special.sys.to_string()),
            "dev" => ("dev", sandbox.special.dev.to_string()),
            "dev_pts" | "dev-pts" => {
                ("dev_pts", sandbox.special.dev_pts.to_string())
            }
            "dev_shm" | "dev-shm" => {
                ("dev_shm", sandbox.special.dev_shm.to_string())
            }
            "resolv_conf" | "resolv-conf" => {
                ("resolv_conf", sandbox.resolv_conf.to_string())
            }
            "path" => ("path", sandbox.guest_path.clone()),
            "lock_dir" | "lock-dir" => ("lock_dir", path_str(&config.lock_dir)),
            "log_file" | "log-file" => ("log_file", path_str(&config.log_file)),
            "log_level" | "log-level" => {
                ("log_level", config.log_level.as_str().to_string())
            }
            _ => {
                return Err(anyhow::anyhow!("Unknown key: {}", key));
            }
        };
        print_config_line(key, &value, multi_line, &config.sources);
    }

    Ok(())
}

fn print_config_line(
    key: &str,
    value: &str,
    multi_line: bool,
    sources: &HashMap<String, String>,
) {
    sources.get(key).map(|s| {
        debug!("{}={} set from {}", key, value, s);
    });
    set_json_output(key, Value::String(value.to_string()));

    if multi_line {
        outln!("{}={}", key, value);
    } else {
        outln!("{}", value);
    }
}
