use std::path::{Path, PathBuf};

const SQL_LIKE_EXTENSIONS: [&str; 4] = ["sql", "ddl", "btq", "txt"];

fn is_sql_like(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SQL_LIKE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Concatenate every SQL-like file under `directory` (recursively),
/// prefixed with a `-- FILE: <name>` marker. Grounded on
/// `graph/nodes/helpers.py`'s `read_sql_files`.
pub fn read_sql_files(directory: &Path) -> String {
    if !directory.is_dir() {
        return String::new();
    }
    let mut chunks = Vec::new();
    for path in list_sql_files(directory) {
        if let Ok(content) = std::fs::read_to_string(&path) {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            chunks.push(format!("-- FILE: {filename}\n{content}\n"));
        }
    }
    chunks.join("\n")
}

/// Return sorted SQL-like file paths under `directory` (recursively).
/// Grounded on `graph/nodes/helpers.py`'s `list_sql_files`.
pub fn list_sql_files(directory: &Path) -> Vec<PathBuf> {
    if !directory.is_dir() {
        return Vec::new();
    }
    let mut files = Vec::new();
    collect_sql_files(directory, &mut files);
    files.sort();
    files
}

fn collect_sql_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_sql_files(&path, out);
        } else if is_sql_like(&path) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_only_sql_like_files_sorted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.sql"), "select 1;").unwrap();
        std::fs::write(dir.path().join("a.ddl"), "create table t();").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignore me").unwrap();

        let files = list_sql_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.ddl"));
        assert!(files[1].ends_with("b.sql"));
    }

    #[test]
    fn read_sql_files_concatenates_with_file_markers() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.sql"), "SELECT 1;").unwrap();

        let content = read_sql_files(dir.path());
        assert!(content.contains("-- FILE: one.sql"));
        assert!(content.contains("SELECT 1;"));
    }

    #[test]
    fn missing_directory_yields_empty_results() {
        let missing = Path::new("/does/not/exist/at/all");
        assert!(list_sql_files(missing).is_empty());
        assert_eq!(read_sql_files(missing), "");
    }
}
