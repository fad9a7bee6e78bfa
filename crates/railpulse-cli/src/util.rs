use std::{
    fs::File,
    io::{self, Write as _},
    path::Path,
};

use anyhow::Context;
use railpulse_dataset::store::write_atomic;

/// Writes a command report to `path`, or to stdout when no path is given.
pub fn emit_json<T>(value: &T, path: Option<&Path>) -> anyhow::Result<()>
where
    T: serde::Serialize,
{
    if let Some(path) = path {
        return write_json_atomic("report", path, value);
    }
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("Failed to write JSON to stdout")?;
    writeln!(stdout).context("Failed to write newline after JSON to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Writes `value` as pretty JSON through a temporary file renamed over `path`.
pub fn write_json_atomic<T>(file_kind: &str, path: &Path, value: &T) -> anyhow::Result<()>
where
    T: serde::Serialize,
{
    let mut bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to encode {file_kind} JSON"))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
        .with_context(|| format!("Failed to write {} file: {}", file_kind, path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_atomic_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.json");
        let value = BTreeMap::from([("records", 3)]);

        write_json_atomic("report", &path, &value).unwrap();
        let read: BTreeMap<String, i32> = read_json_file("report", &path).unwrap();
        assert_eq!(read["records"], 3);
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let err = read_json_file::<BTreeMap<String, i32>, _>("model", &path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
