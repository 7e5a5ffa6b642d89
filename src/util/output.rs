#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::sync::Mutex;

static JSON_OUTPUT: Mutex<Option<Map<String, Value>>> = Mutex::new(None);
static SHOULD_PRINT_OUTPUT: Mutex<bool> = Mutex::new(true);

/// Human readable output is suppressed when `--json` is in effect.
pub fn set_should_print_output(should_print: bool) {
    *SHOULD_PRINT_OUTPUT
        .lock()
        .expect("Failed to lock SHOULD_PRINT_OUTPUT") = should_print;
}

pub fn print_output(printed_output: &str) {
    if *SHOULD_PRINT_OUTPUT
        .lock()
        .expect("Failed to lock SHOULD_PRINT_OUTPUT")
    {
        println!("{}", printed_output);
    }
}

pub fn set_json_output(key: &str, value: Value) {
    JSON_OUTPUT
        .lock()
        .expect("Failed to lock JSON_OUTPUT")
        .get_or_insert_with(Map::new)
        .insert(key.to_string(), value);
}

#[macro_export]
macro_rules! outln {
    ( $fmt:expr $(, $args:expr)*) => {
        $crate::util::print_output(&format!($fmt $(, $args)*))
    };
}

pub fn print_json_output() -> Result<()> {
    let map = JSON_OUTPUT
        .lock()
        .expect("Failed to lock JSON_OUTPUT")
        .take()
        .unwrap_or_default();
    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(map))
            .context("Error serializing JSON")?
    );
    Ok(())
}
