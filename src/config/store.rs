//! 扁平 key=value 配置存储（`.env`）
//!
//! 解析规则：
//! - 忽略空行和以 `#` 开头的行
//! - 按第一个 `=` 切分，去掉两侧空白和一层成对引号
//! - 没有 `=` 的行直接跳过
//! - 重复的 key 以最后一次出现为准

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 配置加载错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

impl ConfigError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 控制类后缀，不属于凭据
const CONTROL_KEYS: &[&str] = &["ENABLE", "VERSION", "URL"];

/// 配置存储（一次请求周期内只读）
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    entries: BTreeMap<String, String>,
}

impl ConfigStore {
    /// 从文本解析
    pub fn parse(source: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in source.lines() {
            if let Some((key, value)) = parse_line(line) {
                entries.insert(key.to_string(), value.to_string());
            }
        }
        Self { entries }
    }

    /// 从文件加载，文件不存在时返回空配置
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let store = Self::parse(&content);
                debug!(path = %path.display(), entries = store.len(), "Loaded env file");
                Ok(store)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Env file not found, using empty configuration");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::io(path, e)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 取值，不存在时返回调用方给的默认值
    pub fn get<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.entries.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 取非空值
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.value(key).filter(|v| !v.is_empty())
    }

    /// 布尔开关：`true`（不区分大小写）或 `1`
    pub fn flag(&self, key: &str) -> bool {
        self.value(key).map(is_truthy).unwrap_or(false)
    }

    /// 带默认值的布尔开关
    pub fn flag_or(&self, key: &str, default: bool) -> bool {
        self.value(key).map(is_truthy).unwrap_or(default)
    }

    /// 前缀下的所有键：后缀 -> 值
    pub fn namespace(&self, prefix: &str) -> BTreeMap<String, String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter_map(|(k, v)| {
                let suffix = &k[prefix.len()..];
                (!suffix.is_empty()).then(|| (suffix.to_string(), v.clone()))
            })
            .collect()
    }

    /// 发现某个实体族下声明了 `<FAMILY>_<NAME>_ENABLE` 的所有名字（已规范化）
    pub fn entity_names(&self, family_prefix: &str) -> Vec<String> {
        let prefix = format!("{}_", family_prefix);
        let names: BTreeSet<String> = self
            .namespace(&prefix)
            .keys()
            .filter_map(|suffix| suffix.strip_suffix("_ENABLE"))
            .filter_map(normalize_entity_name)
            .collect();
        names.into_iter().collect()
    }

    /// 实体凭据：命名空间下除控制键外的非空值
    ///
    /// `siblings` 是同族的其他实体名，属于更长兄弟实体的键（`SERVICE_FOO_BAR_*`）不计入 `foo`
    pub fn credentials(
        &self,
        family_prefix: &str,
        name: &str,
        siblings: &[String],
    ) -> BTreeMap<String, String> {
        let segment = config_segment(name);
        let prefix = format!("{}_{}_", family_prefix, segment);
        let shadowing: Vec<String> = siblings
            .iter()
            .filter(|s| s.as_str() != name)
            .map(|s| config_segment(s))
            .filter_map(|s| s.strip_prefix(&format!("{}_", segment)).map(|rest| format!("{}_", rest)))
            .collect();

        self.namespace(&prefix)
            .into_iter()
            .filter(|(k, v)| !v.is_empty() && !CONTROL_KEYS.contains(&k.as_str()))
            .filter(|(k, _)| !shadowing.iter().any(|s| k.starts_with(s.as_str())))
            .collect()
    }

    /// 支持的语言及版本
    pub fn supported_languages(&self) -> SupportedLanguages {
        let languages = split_list(self.get("SUPPORTED_LANGUAGES", ""));
        let mut versions = BTreeMap::new();
        let mut defaults = BTreeMap::new();

        for (suffix, value) in self.namespace("SUPPORTED_LANGUAGES_") {
            if let Some(lang) = suffix.strip_suffix("_VERSIONS") {
                versions.insert(lang.to_lowercase(), split_list(&value));
            } else if let Some(lang) = suffix.strip_suffix("_DEFAULT") {
                defaults.insert(lang.to_lowercase(), value.trim().to_string());
            }
        }

        SupportedLanguages {
            languages,
            versions,
            defaults,
            php_extensions: split_list(self.get("SUPPORTED_LANGUAGES_PHP_EXTENSIONS", "")),
        }
    }
}

/// 支持的语言列表
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedLanguages {
    pub languages: Vec<String>,
    pub versions: BTreeMap<String, Vec<String>>,
    pub defaults: BTreeMap<String, String>,
    pub php_extensions: Vec<String>,
}

/// 规范化实体名：小写、`_` -> `-`，必须匹配 `[a-z0-9-]+`
pub fn normalize_entity_name(raw: &str) -> Option<String> {
    let name = raw.trim().to_lowercase().replace('_', "-");
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    valid.then_some(name)
}

/// 实体名 -> 配置键片段（`foo-bar` -> `FOO_BAR`）
pub fn config_segment(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

/// `.env` 写入器：同一时间只允许一个改写（读-改-写整文件）
pub struct EnvWriter {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl EnvWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 改写单个键，保留其余行和注释；键不存在时追加
    pub async fn write_flag(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let _guard = self.lock.lock().await;
        replace_value(&self.path, key, value).await?;
        debug!(path = %self.path.display(), key = key, value = value, "Rewrote env value");
        Ok(())
    }
}

async fn replace_value(path: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(ConfigError::io(path, e)),
    };
    let rewritten = rewrite_value(&content, key, value);

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let target = path.to_path_buf();

    // 每次写入使用独立的临时文件，再原子替换
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        if let Ok(meta) = std::fs::metadata(&target) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.write_all(rewritten.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ConfigError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e)))?
    .map_err(|e| ConfigError::io(path, e))
}

fn rewrite_value(content: &str, key: &str, value: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| match parse_line(line) {
            Some((k, _)) if k == key => {
                found = true;
                format!("{}={}", key, value)
            }
            _ => line.to_string(),
        })
        .collect();

    if !found {
        lines.push(format!("{}={}", key, value));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# Stackvo
DEFAULT_TLD_SUFFIX=stackvo.loc
SSL_ENABLE=true

SERVICE_REDIS_ENABLE=true
SERVICE_REDIS_VERSION="7"
SERVICE_MYSQL_ENABLE=false
SERVICE_MYSQL_ROOT_PASSWORD = 'root'
SERVICE_MYSQL_DATABASE=stackvo
SERVICE_MYSQL_URL=mysql
this line is malformed
=novalue
TOOLS_ADMINER_ENABLE=TRUE
SERVICE_REDIS_VERSION=7.2
"#;

    #[test]
    fn test_last_write_wins() {
        let store = ConfigStore::parse(SAMPLE);
        assert_eq!(store.get("SERVICE_REDIS_VERSION", ""), "7.2");
    }

    #[test]
    fn test_skips_comments_and_malformed_lines() {
        let store = ConfigStore::parse(SAMPLE);
        assert!(store.value("# Stackvo").is_none());
        assert!(store.value("this line is malformed").is_none());
        assert!(store.value("").is_none());
        assert_eq!(store.len(), 9);
    }

    #[test]
    fn test_trims_single_quote_layer() {
        let store = ConfigStore::parse("A=\"'x'\"\nB='y'\nC=\"unbalanced\nD= spaced ");
        assert_eq!(store.get("A", ""), "'x'");
        assert_eq!(store.get("B", ""), "y");
        assert_eq!(store.get("C", ""), "\"unbalanced");
        assert_eq!(store.get("D", ""), "spaced");
    }

    #[test]
    fn test_value_split_on_first_equals() {
        let store = ConfigStore::parse("DSN=mysql://u:p@h/db?x=1");
        assert_eq!(store.get("DSN", ""), "mysql://u:p@h/db?x=1");
    }

    #[test]
    fn test_absent_key_returns_default() {
        let store = ConfigStore::parse(SAMPLE);
        assert_eq!(store.get("NOPE", "fallback"), "fallback");
        assert!(!store.flag("NOPE"));
        assert!(store.flag_or("NOPE", true));
        assert!(store.flag("TOOLS_ADMINER_ENABLE"));
    }

    #[test]
    fn test_namespace() {
        let store = ConfigStore::parse(SAMPLE);
        let ns = store.namespace("SERVICE_MYSQL_");
        assert_eq!(ns.len(), 4);
        assert_eq!(ns.get("ROOT_PASSWORD").map(String::as_str), Some("root"));
        assert_eq!(ns.get("ENABLE").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_entity_names_require_enable_key() {
        let store = ConfigStore::parse(
            "SERVICE_REDIS_ENABLE=true\nSERVICE_GHOST_VERSION=1\nSERVICE_ELASTIC_SEARCH_ENABLE=false\n",
        );
        assert_eq!(
            store.entity_names("SERVICE"),
            vec!["elastic-search".to_string(), "redis".to_string()]
        );
    }

    #[test]
    fn test_credentials_exclude_control_and_sibling_keys() {
        let store = ConfigStore::parse(
            "SERVICE_FOO_ENABLE=true\nSERVICE_FOO_USER=admin\nSERVICE_FOO_URL=foo\n\
             SERVICE_FOO_PASSWORD=\nSERVICE_FOO_BAR_ENABLE=true\nSERVICE_FOO_BAR_USER=other\n",
        );
        let names = store.entity_names("SERVICE");
        let creds = store.credentials("SERVICE", "foo", &names);
        assert_eq!(creds.len(), 1);
        assert_eq!(creds.get("USER").map(String::as_str), Some("admin"));

        let creds = store.credentials("SERVICE", "foo-bar", &names);
        assert_eq!(creds.get("USER").map(String::as_str), Some("other"));
    }

    #[test]
    fn test_supported_languages() {
        let store = ConfigStore::parse(
            "SUPPORTED_LANGUAGES=php, nodejs\nSUPPORTED_LANGUAGES_PHP_VERSIONS=8.2,8.3\n\
             SUPPORTED_LANGUAGES_PHP_DEFAULT=8.3\nSUPPORTED_LANGUAGES_PHP_EXTENSIONS=pdo,mysqli\n",
        );
        let langs = store.supported_languages();
        assert_eq!(langs.languages, vec!["php", "nodejs"]);
        assert_eq!(langs.versions["php"], vec!["8.2", "8.3"]);
        assert_eq!(langs.defaults["php"], "8.3");
        assert_eq!(langs.php_extensions, vec!["pdo", "mysqli"]);
    }

    #[test]
    fn test_normalize_entity_name() {
        assert_eq!(normalize_entity_name("REDIS"), Some("redis".to_string()));
        assert_eq!(normalize_entity_name("ELASTIC_SEARCH"), Some("elastic-search".to_string()));
        assert_eq!(normalize_entity_name("bad.name"), None);
        assert_eq!(normalize_entity_name(""), None);
        assert_eq!(config_segment("elastic-search"), "ELASTIC_SEARCH");
    }

    #[test]
    fn test_rewrite_value() {
        let out = rewrite_value("# c\nSERVICE_REDIS_ENABLE=false\nX=1", "SERVICE_REDIS_ENABLE", "true");
        assert_eq!(out, "# c\nSERVICE_REDIS_ENABLE=true\nX=1\n");

        let out = rewrite_value("X=1\n", "NEW_KEY", "v");
        assert_eq!(out, "X=1\nNEW_KEY=v\n");
    }

    #[tokio::test]
    async fn test_write_flag_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        tokio::fs::write(&path, "# header\nTOOLS_ADMINER_ENABLE=false\n")
            .await
            .unwrap();

        EnvWriter::new(&path)
            .write_flag("TOOLS_ADMINER_ENABLE", "true")
            .await
            .unwrap();

        let store = ConfigStore::load(&path).await.unwrap();
        assert!(store.flag("TOOLS_ADMINER_ENABLE"));
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.starts_with("# header\n"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_keep_every_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        tokio::fs::write(&path, "# flags\n").await.unwrap();
        let writer = std::sync::Arc::new(EnvWriter::new(&path));

        for round in 0..50 {
            let a = format!("SERVICE_A{}_ENABLE", round);
            let b = format!("SERVICE_B{}_ENABLE", round);
            let (ra, rb) = tokio::join!(
                writer.write_flag(&a, "true"),
                writer.write_flag(&b, "true")
            );
            ra.unwrap();
            rb.unwrap();
        }

        let store = ConfigStore::load(&path).await.unwrap();
        assert_eq!(store.len(), 100);
        assert!(store.flag("SERVICE_A0_ENABLE"));
        assert!(store.flag("SERVICE_B49_ENABLE"));

        // 没有残留的临时文件
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_concurrent_tasks_share_one_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let writer = std::sync::Arc::new(EnvWriter::new(&path));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let writer = writer.clone();
                tokio::spawn(async move {
                    writer
                        .write_flag(&format!("TOOLS_T{}_ENABLE", i), "false")
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let store = ConfigStore::load(&path).await.unwrap();
        assert_eq!(store.entity_names("TOOLS").len(), 16);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("missing.env")).await.unwrap();
        assert!(store.is_empty());
    }
}
