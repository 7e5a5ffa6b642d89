use super::cli::Args;
use super::{
    Config, DEFAULT_GUEST_PATH, DEFAULT_LOCK_DIR, DEFAULT_LOG_FILE,
    DEFAULT_USER, PartialConfig, SandboxConfig, SpecialFilesystems,
};
use crate::error::ChrootError;
use crate::util::{can_access, expand_tilde_path, resolve_uid_gid_home};
use anyhow::{Context, Result};
use log::trace;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::{env, str::FromStr};

pub fn resolve_config(cli: Args) -> Result<Config> {
    let (mut partial_config, mut sources) = load_partial(cli.no_config)?;

    // Override with environment variables if set
    if let Ok(log_level) = env::var("CHROOTCTL_LOG_LEVEL") {
        if let Ok(log_level) = log::LevelFilter::from_str(&log_level) {
            partial_config.log_level = Some(log_level);
            sources.insert("log_level".into(), "environment".into());
        } else {
            return Err(anyhow::anyhow!("Invalid log level: {}", log_level));
        }
    }

    for (var, key, slot) in [
        ("CHROOTCTL_ROOT", "root", &mut partial_config.root),
        ("CHROOTCTL_NAME", "name", &mut partial_config.name),
        ("CHROOTCTL_USER", "user", &mut partial_config.user),
        ("CHROOTCTL_PATH", "path", &mut partial_config.path),
        ("CHROOTCTL_LOCK_DIR", "lock_dir", &mut partial_config.lock_dir),
        ("CHROOTCTL_LOG_FILE", "log_file", &mut partial_config.log_file),
    ] {
        if let Ok(value) = env::var(var) {
            if !value.is_empty() {
                *slot = Some(value);
                sources.insert(key.into(), "environment".into());
            }
        }
    }

    // Bind directories from the environment are additive
    if let Ok(bind_env) = env::var("CHROOTCTL_BIND") {
        let env_binds: Vec<String> = bind_env
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if !env_binds.is_empty() {
            match &mut partial_config.bind_dirs {
                Some(existing) => existing.extend(env_binds),
                None => partial_config.bind_dirs = Some(env_binds),
            }
            sources.insert("bind".into(), "environment".into());
        }
    }

    // Override with CLI args if provided (highest precedence)
    if let Some(log_level) = cli.log_level {
        partial_config.log_level = Some(log_level);
        sources.insert("log_level".into(), "cli".into());
    }

    for (key, value, slot) in [
        ("root", cli.root, &mut partial_config.root),
        ("name", cli.name, &mut partial_config.name),
        ("user", cli.default_user, &mut partial_config.user),
        ("path", cli.path, &mut partial_config.path),
        ("lock_dir", cli.lock_dir, &mut partial_config.lock_dir),
        ("log_file", cli.log_file, &mut partial_config.log_file),
    ] {
        if let Some(value) = value {
            *slot = Some(value);
            sources.insert(key.into(), "cli".into());
        }
    }

    for (key, disabled, slot) in [
        ("proc", cli.no_proc, &mut partial_config.proc),
        ("sys", cli.no_sys, &mut partial_config.sys),
        ("dev", cli.no_dev, &mut partial_config.dev),
        ("dev_pts", cli.no_dev_pts, &mut partial_config.dev_pts),
        ("dev_shm", cli.no_dev_shm, &mut partial_config.dev_shm),
        ("resolv_conf", cli.no_resolv_conf, &mut partial_config.resolv_conf),
    ] {
        if disabled {
            *slot = Some(false);
            sources.insert(key.into(), "cli".into());
        }
    }

    if let Some(cli_binds) = cli.bind {
        match &mut partial_config.bind_dirs {
            Some(existing) => existing.extend(cli_binds),
            None => partial_config.bind_dirs = Some(cli_binds),
        }
        sources.insert("bind".into(), "cli".into());
    }

    build_config(partial_config, sources)
}

/// Fills in defaults and turns the merged partial config into the immutable
/// runtime config.
fn build_config(
    partial_config: PartialConfig,
    mut sources: HashMap<String, String>,
) -> Result<Config> {
    let root = match partial_config.root {
        Some(root) if !root.is_empty() => expand_tilde_path(Path::new(&root))?,
        _ => {
            return Err(ChrootError::FatalConfig(
                "no sandbox root configured, use --root or set `root` in a config file"
                    .into(),
            )
            .into());
        }
    };

    let name = match partial_config.name {
        Some(name) => name,
        None => {
            sources.insert("name".into(), "derived from root".into());
            root.file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
        }
    };

    let mut default = |key: &str| {
        if !sources.contains_key(key) {
            sources.insert(key.into(), "default".into());
        }
    };

    let user = partial_config.user.unwrap_or(DEFAULT_USER.to_string());
    default("user");

    let defaults = SpecialFilesystems::default();
    let special = SpecialFilesystems {
        proc: partial_config.proc.unwrap_or(defaults.proc),
        sys: partial_config.sys.unwrap_or(defaults.sys),
        dev: partial_config.dev.unwrap_or(defaults.dev),
        dev_pts: partial_config.dev_pts.unwrap_or(defaults.dev_pts),
        dev_shm: partial_config.dev_shm.unwrap_or(defaults.dev_shm),
    };
    for key in ["proc", "sys", "dev", "dev_pts", "dev_shm"] {
        default(key);
    }

    let resolv_conf = partial_config.resolv_conf.unwrap_or(true);
    default("resolv_conf");

    let guest_path = partial_config
        .path
        .unwrap_or(DEFAULT_GUEST_PATH.to_string());
    default("path");

    let lock_dir = expand_tilde_path(Path::new(
        &partial_config
            .lock_dir
            .unwrap_or(DEFAULT_LOCK_DIR.to_string()),
    ))?;
    default("lock_dir");

    let log_file = expand_tilde_path(Path::new(
        &partial_config
            .log_file
            .unwrap_or(DEFAULT_LOG_FILE.to_string()),
    ))?;
    default("log_file");

    // Deduplicate bind directories, preserving order
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut bind_dirs = Vec::new();
    for dir in partial_config.bind_dirs.unwrap_or_default() {
        let dir = expand_tilde_path(Path::new(&dir))?;
        if seen.insert(dir.clone()) {
            bind_dirs.push(dir);
        }
    }
    default("bind");

    let mut config = Config {
        log_level: partial_config.log_level.unwrap_or(log::LevelFilter::Info),
        lock_dir,
        log_file,
        sources,
        sandbox: SandboxConfig {
            root,
            name,
            user,
            bind_dirs,
            special,
            resolv_conf,
            guest_path,
        },
    };

    config.sandbox.validate()?;
    // Mount targets are compared against the kernel's mount table, which only
    // holds resolved paths
    config.sandbox.root = config.sandbox.root.canonicalize().context(format!(
        "Failed to resolve sandbox root {}",
        config.sandbox.root.display()
    ))?;

    trace!("Sandbox root: {:?}", config.sandbox.root);
    trace!("Sandbox name: {:?}", config.sandbox.name);

    Ok(config)
}

pub fn load_partial(
    no_config: bool,
) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_paths = if no_config {
        vec![]
    } else {
        find_config_files()?
    };
    let mut sources = HashMap::new();
    if config_paths.is_empty() {
        trace!("No config files found, using default config");
        return Ok((PartialConfig::default(), sources));
    }

    let mut merged_config = PartialConfig::default();
    for path in config_paths.iter() {
        let config_str = std::fs::read_to_string(path).context(format!(
            "Failed to read config file {}",
            path.display()
        ))?;

        let config: PartialConfig = toml::from_str(&config_str).context(
            format!("Failed to parse config file {}", path.display()),
        )?;

        merge_configs(
            &mut merged_config,
            &mut sources,
            config,
            path.to_str()
                .context("Failed to convert config path to str")?,
        );
        trace!("Loaded config file: {}", path.display());
    }

    Ok((merged_config, sources))
}

/** Returns all readable config files, lowest precedence first */
fn find_config_files() -> Result<Vec<PathBuf>> {
    let uid_gid_home = resolve_uid_gid_home()?;
    let mut paths_to_check = Vec::new();

    // Any project specific files
    let mut current_dir = std::env::current_dir()?;
    loop {
        paths_to_check.push(current_dir.join(".chrootctl.toml"));
        if current_dir == uid_gid_home.home || !current_dir.pop() {
            break;
        }
    }

    paths_to_check.push(uid_gid_home.home.join(".config/chrootctl/config.toml"));
    paths_to_check.push(PathBuf::from("/etc/chrootctl.toml"));

    // Finally reverse them so we can process them in order nicely
    paths_to_check.reverse();

    Ok(paths_to_check
        .iter()
        .filter(|path| {
            path.exists()
                && can_access(
                    path,
                    uid_gid_home.uid,
                    uid_gid_home.gid,
                    nix::unistd::AccessFlags::R_OK,
                )
                .is_ok()
        })
        .cloned()
        .collect())
}

fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    if let Some(log_level) = override_config.log_level {
        base.log_level = Some(log_level);
        sources.insert("log_level".into(), source.into());
    }

    for (key, value, slot) in [
        ("root", override_config.root, &mut base.root),
        ("name", override_config.name, &mut base.name),
        ("user", override_config.user, &mut base.user),
        ("path", override_config.path, &mut base.path),
        ("lock_dir", override_config.lock_dir, &mut base.lock_dir),
        ("log_file", override_config.log_file, &mut base.log_file),
    ] {
        if let Some(value) = value {
            *slot = Some(value);
            sources.insert(key.into(), source.into());
        }
    }

    for (key, value, slot) in [
        ("proc", override_config.proc, &mut base.proc),
        ("sys", override_config.sys, &mut base.sys),
        ("dev", override_config.dev, &mut base.dev),
        ("dev_pts", override_config.dev_pts, &mut base.dev_pts),
        ("dev_shm", override_config.dev_shm, &mut base.dev_shm),
        ("resolv_conf", override_config.resolv_conf, &mut base.resolv_conf),
    ] {
        if let Some(value) = value {
            *slot = Some(value);
            sources.insert(key.into(), source.into());
        }
    }

    // Bind directories accumulate across files
    if let Some(bind_dirs) = override_config.bind_dirs {
        match &mut base.bind_dirs {
            Some(existing) => existing.extend(bind_dirs),
            None => base.bind_dirs = Some(bind_dirs),
        }
        sources.insert("bind".into(), source.into());
    }
}
