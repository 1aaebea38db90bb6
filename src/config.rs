//! Runtime configuration driven by environment variables.
//!
//! Every knob has a working default so the library runs without any
//! environment setup; deployments override the pieces they care about.

use std::env;
use std::path::PathBuf;

const DEFAULT_STORAGE_ROOT: &str = ".manuweaver";
const DEFAULT_OPENALEX_BASE: &str = "https://api.openalex.org";
const DEFAULT_ARXIV_BASE: &str = "http://export.arxiv.org/api";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";
const DEFAULT_MODEL: &str = "llama3";

/// Runtime settings for storage, provider endpoints, and the LLM backend.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for project and job JSON storage.
    pub storage_root: PathBuf,
    /// Contact email for the Crossref polite pool; omitted when unset.
    pub crossref_mailto: Option<String>,
    /// `OpenAlex` API base URL.
    pub openalex_base: String,
    /// arXiv export API base URL.
    pub arxiv_base: String,
    /// LLM backend selector: "stub", "ollama", or "lmstudio".
    pub llm_provider: String,
    /// Ollama server base URL.
    pub ollama_base_url: String,
    /// Ollama model name.
    pub ollama_model: String,
    /// LM Studio server base URL (OpenAI-compatible).
    pub lmstudio_base_url: String,
    /// LM Studio model name.
    pub lmstudio_model: String,
}

impl Settings {
    /// Reads settings from the process environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            storage_root: PathBuf::from(env_or("STORAGE_ROOT", DEFAULT_STORAGE_ROOT)),
            crossref_mailto: env::var("CROSSREF_MAILTO").ok().filter(|v| !v.is_empty()),
            openalex_base: env_or("OPENALEX_BASE", DEFAULT_OPENALEX_BASE),
            arxiv_base: env_or("ARXIV_BASE", DEFAULT_ARXIV_BASE),
            llm_provider: env_or("LLM_PROVIDER", "stub"),
            ollama_base_url: env_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            ollama_model: env_or("OLLAMA_MODEL", DEFAULT_MODEL),
            lmstudio_base_url: env_or("LMSTUDIO_BASE_URL", DEFAULT_LMSTUDIO_BASE_URL),
            lmstudio_model: env_or("LMSTUDIO_MODEL", DEFAULT_MODEL),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            crossref_mailto: None,
            openalex_base: DEFAULT_OPENALEX_BASE.to_string(),
            arxiv_base: DEFAULT_ARXIV_BASE.to_string(),
            llm_provider: "stub".to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_MODEL.to_string(),
            lmstudio_base_url: DEFAULT_LMSTUDIO_BASE_URL.to_string(),
            lmstudio_model: DEFAULT_MODEL.to_string(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
