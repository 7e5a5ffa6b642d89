mod fixtures;

use anyhow::Result;
use fixtures::*;
use rstest::*;

#[rstest]
fn test_json_config(mut chroot: ChrootManager) -> Result<()> {
    let json = chroot.json(&["config", "name", "user"])?;
    assert_eq!(json["status"], "success");
    assert_eq!(json["name"], "jail");
    assert_eq!(json["user"], "root");
    Ok(())
}

/* Errors still produce a JSON object, with a non-zero exit code */
#[rstest]
fn test_json_error(mut chroot: ChrootManager) -> Result<()> {
    let json = chroot.json(&["--root=/", "config"])?;
    assert_eq!(chroot.last_code, Some(1));
    assert_eq!(json["status"], "error");
    assert!(
        json["error"]
            .as_str()
            .unwrap_or_default()
            .contains("protected host directory")
    );
    Ok(())
}

#[rstest]
fn test_json_status(mut chroot: ChrootManager) -> Result<()> {
    if !is_root() {
        return Ok(());
    }
    let json = chroot.json(&["status"])?;
    assert_eq!(json["status"], "success");
    assert_eq!(json["name"], "jail");
    assert_eq!(json["lock"]["state"], "absent");
    let mounts = json["mounts"].as_array().cloned().unwrap_or_default();
    assert_eq!(mounts.len(), 5);
    assert_eq!(mounts[0]["label"], "proc");
    assert_eq!(mounts[3]["label"], "dev/pts");
    assert!(mounts.iter().all(|m| m["mounted"] == false));
    Ok(())
}
