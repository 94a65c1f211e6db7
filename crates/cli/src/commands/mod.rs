pub mod config_cmd;
pub mod inspect;
pub mod run;
pub mod tools;

use std::io::Read;
use std::path::Path;

/// Read plan text from a file, or from stdin when the path is `-`.
pub fn read_plan(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read plan {}: {e}", path.display()).into())
}
