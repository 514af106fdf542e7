use std::collections::HashMap;
use std::env;
use std::path::Path;

/// A set of `.env` files for a named profile.
///
/// Files are read in the order `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`,
/// later files overriding earlier ones. Variables already present in the process environment are
/// never overridden.
#[derive(Debug, Clone)]
pub struct EnvFile {
    name: String,
}

impl EnvFile {
    /// Creates an env file loader for a profile.
    pub fn new<S>(name: S) -> Self
    where
        S: Into<String>,
    {
        Self { name: name.into() }
    }

    /// Returns the file names of the profile, lowest priority first.
    pub fn file_names(&self) -> [String; 4] {
        [
            ".env".to_owned(),
            ".env.local".to_owned(),
            format!(".env.{}", self.name),
            format!(".env.{}.local", self.name),
        ]
    }

    /// Loads all env files found in `dir`.
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn load<P>(&self, dir: P) -> HashMap<String, String>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        let mut envs = HashMap::new();

        for path in self.file_names().iter().map(|m| dir.join(m)) {
            if !path.is_file() {
                continue;
            }

            match read_file(&path) {
                Ok(m) => envs.extend(m),
                Err(e) => {
                    tracing::warn!(path = %path.display(), reason = ?e, "skipping env file")
                }
            }
        }

        tracing::debug!(profile = %self.name, loaded = envs.len(), "loaded env files");

        envs
    }
}

/// Reads the variables of one file that are not set in the process environment.
fn read_file(path: &Path) -> dotenvy::Result<Vec<(String, String)>> {
    let mut vars = Vec::new();

    for item in dotenvy::from_path_iter(path)? {
        let (k, v) = item?;
        if env::var_os(&k).is_none() {
            vars.push((k, v));
        }
    }

    Ok(vars)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "LIVELINE_T_A=base\nLIVELINE_T_B=base\n").unwrap();
        fs::write(dir.path().join(".env.staging"), "LIVELINE_T_B=staging\n").unwrap();

        let envs = EnvFile::new("staging").load(dir.path());

        assert_eq!(envs.get("LIVELINE_T_A").map(String::as_str), Some("base"));
        assert_eq!(envs.get("LIVELINE_T_B").map(String::as_str), Some("staging"));
    }

    #[test]
    fn process_environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "LIVELINE_T_PROCESS=file\n").unwrap();
        env::set_var("LIVELINE_T_PROCESS", "process");

        let envs = EnvFile::new("dev").load(dir.path());

        assert!(!envs.contains_key("LIVELINE_T_PROCESS"));
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let envs = EnvFile::new("dev").load("/nonexistent/liveline");
        assert!(envs.is_empty());
    }
}
