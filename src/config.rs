use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub z3: Z3Config,
    pub search: SearchConfig,
}

#[derive(Debug, Clone)]
pub struct Z3Config {
    /// Default timeout for Z3 queries (ms)
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum box/diamond nesting in candidate formulas
    pub modal_depth: usize,
    /// Carrier size bound for the finite structure search
    pub model_size: usize,
    /// Stop after this many candidates; `None` runs to template exhaustion
    pub max_candidates: Option<usize>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            z3: Z3Config { timeout_ms: 30_000 },
            search: SearchConfig {
                modal_depth: 2,
                model_size: 4,
                max_candidates: None,
            },
        }
    }
}

/// Load configuration with the following precedence:
/// 1. Env `MODALSYNTH_CONFIG` path
/// 2. `$HOME/.config/modalsynth/config.toml`
/// 3. `config/modalsynth.toml` relative to CWD
/// 4. Defaults
///
/// Env overrides for common fields are applied last:
///   - MODALSYNTH_Z3_TIMEOUT_MS
///   - MODALSYNTH_MODAL_DEPTH / MODALSYNTH_MODEL_SIZE
pub fn load() -> SynthConfig {
    let mut cfg = SynthConfig::default();

    for path in candidate_paths() {
        if let Some(partial) = read_partial(&path) {
            cfg.apply_partial(partial);
            break;
        }
    }

    apply_env_overrides(&mut cfg);
    cfg
}

fn candidate_paths() -> Vec<std::path::PathBuf> {
    let mut paths = Vec::new();

    if let Ok(p) = std::env::var("MODALSYNTH_CONFIG") {
        paths.push(std::path::PathBuf::from(p));
    }

    if let Ok(home) = std::env::var("HOME") {
        paths.push(std::path::Path::new(&home).join(".config/modalsynth/config.toml"));
    }

    paths.push(std::path::PathBuf::from("config/modalsynth.toml"));

    paths
}

#[derive(Debug, Deserialize)]
struct PartialConfig {
    z3: Option<PartialZ3>,
    search: Option<PartialSearch>,
}

#[derive(Debug, Deserialize)]
struct PartialZ3 {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PartialSearch {
    modal_depth: Option<usize>,
    model_size: Option<usize>,
    max_candidates: Option<usize>,
}

fn read_partial(path: &std::path::Path) -> Option<PartialConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str::<PartialConfig>(&content).ok()
}

impl SynthConfig {
    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(z3) = partial.z3 {
            if let Some(timeout_ms) = z3.timeout_ms {
                self.z3.timeout_ms = timeout_ms;
            }
        }

        if let Some(search) = partial.search {
            if let Some(modal_depth) = search.modal_depth {
                self.search.modal_depth = modal_depth;
            }
            if let Some(model_size) = search.model_size {
                self.search.model_size = model_size;
            }
            if let Some(max_candidates) = search.max_candidates {
                self.search.max_candidates = Some(max_candidates);
            }
        }
    }
}

fn apply_env_overrides(cfg: &mut SynthConfig) {
    if let Ok(timeout) = std::env::var("MODALSYNTH_Z3_TIMEOUT_MS") {
        if let Ok(v) = timeout.parse::<u64>() {
            cfg.z3.timeout_ms = v;
        }
    }
    if let Ok(depth) = std::env::var("MODALSYNTH_MODAL_DEPTH") {
        if let Ok(v) = depth.parse::<usize>() {
            cfg.search.modal_depth = v;
        }
    }
    if let Ok(size) = std::env::var("MODALSYNTH_MODEL_SIZE") {
        if let Ok(v) = size.parse::<usize>() {
            cfg.search.model_size = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = SynthConfig::default();
        assert_eq!(cfg.z3.timeout_ms, 30_000);
        assert_eq!(cfg.search.modal_depth, 2);
        assert_eq!(cfg.search.model_size, 4);
        assert_eq!(cfg.search.max_candidates, None);
    }

    #[test]
    fn test_partial_merge() {
        let mut cfg = SynthConfig::default();
        let partial: PartialConfig = toml::from_str(
            r#"
            [search]
            modal_depth = 3
            "#,
        )
        .unwrap();

        cfg.apply_partial(partial);
        assert_eq!(cfg.search.modal_depth, 3);
        // untouched sections keep their defaults
        assert_eq!(cfg.z3.timeout_ms, 30_000);
    }

    #[test]
    fn test_read_partial_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[z3]\ntimeout_ms = 1234").unwrap();

        let partial = read_partial(file.path()).expect("readable config");
        assert_eq!(partial.z3.unwrap().timeout_ms, Some(1234));
    }

    #[test]
    fn test_read_partial_missing_file() {
        assert!(read_partial(std::path::Path::new("/nonexistent/modalsynth.toml")).is_none());
    }
}
