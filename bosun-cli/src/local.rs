//! Directory-backed plugin store and module host
//!
//! Layout under the data root:
//!
//! ```text
//! plugins/<name>/        installed plugin tree
//! config/<name>.yaml     raw plugin configuration
//! cache/<name>/          build cache
//! requirements/<name>    installed dependency records
//! installed/<name>       "installed" marker
//! ```

use async_trait::async_trait;
use bosun_core::{
    ArtifactFormat, Error, InstalledPluginState, MetadataDocument, PluginName, Result,
    SourceArtifact,
};
use bosun_runtime::{EventPublisher, PluginHost, PluginStore};
use flate2::read::{DeflateDecoder, GzDecoder};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const METADATA_FILE: &str = "metadata.json";

/// Plugin store and module host over a local data directory
#[derive(Debug)]
pub struct LocalHost {
    root: PathBuf,
    loaded: RwLock<BTreeSet<PluginName>>,
}

impl LocalHost {
    /// Open (creating if needed) a data root
    ///
    /// Every plugin already on disk counts as loaded.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["plugins", "config", "cache", "requirements", "installed"] {
            fs::create_dir_all(root.join(dir))?;
        }

        let host = Self {
            root,
            loaded: RwLock::new(BTreeSet::new()),
        };
        let present = host.plugin_names()?;
        info!(root = %host.root.display(), plugins = present.len(), "Local plugin host opened");
        *host.loaded.write() = present.into_iter().collect();
        Ok(host)
    }

    fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    fn plugin_dir(&self, name: &str) -> PathBuf {
        self.plugins_dir().join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.root.join("config").join(format!("{name}.yaml"))
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join("cache").join(name)
    }

    fn records_path(&self, name: &str) -> PathBuf {
        self.root.join("requirements").join(name)
    }

    fn marker_path(&self, name: &str) -> PathBuf {
        self.root.join("installed").join(name)
    }

    /// Installed plugin directories, sorted
    fn plugin_names(&self) -> Result<Vec<PluginName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.plugins_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn config_data(&self, name: &str) -> Vec<u8> {
        fs::read(self.config_path(name)).unwrap_or_default()
    }
}

/// Reject names that would leave the plugin directory
fn checked(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.starts_with('.') => Ok(name),
        _ => Err(Error::host(format!("Invalid plugin name: {name:?}"))),
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Internal(format!("Blocking task failed: {e}")))?
}

fn read_metadata(dir: &Path) -> Result<MetadataDocument> {
    match fs::read(dir.join(METADATA_FILE)) {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Plugin has no metadata file");
            Ok(MetadataDocument::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Stage the artifact next to the live tree, then swap it in
fn install(plugins: &Path, name: &str, artifact: &SourceArtifact) -> Result<usize> {
    let staging = plugins.join(format!(".staging-{name}"));
    remove_dir_if_exists(&staging)?;
    fs::create_dir_all(&staging)?;

    let (content, files) = match stage(artifact, &staging) {
        Ok(staged) => staged,
        Err(e) => {
            remove_dir_if_exists(&staging)?;
            return Err(e);
        }
    };

    let target = plugins.join(name);
    remove_dir_if_exists(&target)?;
    fs::rename(&content, &target)?;
    if content != staging {
        remove_dir_if_exists(&staging)?;
    }
    Ok(files)
}

/// Fill `staging`; returns the plugin root inside it and the file count
fn stage(artifact: &SourceArtifact, staging: &Path) -> Result<(PathBuf, usize)> {
    match artifact.format() {
        ArtifactFormat::Directory => {
            let files = copy_tree(artifact.path(), staging)?;
            Ok((staging.to_path_buf(), files))
        }
        ArtifactFormat::TarGz | ArtifactFormat::Zip => {
            let files = if artifact.format() == ArtifactFormat::Zip {
                unpack_zip(artifact.path(), staging)?
            } else {
                unpack_tarball(artifact.path(), staging)?
            };
            let root = single_child_dir(staging)?.unwrap_or_else(|| staging.to_path_buf());
            Ok((root, files))
        }
    }
}

fn escapes(entry_path: &Path) -> bool {
    entry_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
}

fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut files = 0;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let target = dst.join(relative);

        let kind = entry.file_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            files += 1;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }

    Ok(files)
}

fn unpack_tarball(path: &Path, dst: &Path) -> Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(fs::File::open(path)?));
    let mut files = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if escapes(&entry_path) {
            return Err(Error::host(format!(
                "Archive entry escapes the plugin directory: {}",
                entry_path.display()
            )));
        }

        let target = dst.join(&entry_path);
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
            files += 1;
        } else {
            debug!(path = %entry_path.display(), "Skipping archive entry");
        }
    }

    Ok(files)
}

fn unpack_zip(path: &Path, dst: &Path) -> Result<usize> {
    let buf = fs::read(path)?;
    let archive = rawzip::ZipArchive::from_slice(&buf)
        .map_err(|e| Error::host(format!("Invalid zip archive: {e:?}")))?;
    let mut files = 0;

    for entry in archive.entries() {
        let entry = entry.map_err(|e| Error::host(format!("Zip entry error: {e:?}")))?;
        let name = entry
            .file_path()
            .try_normalize()
            .map_err(|e| Error::host(format!("Bad zip entry path: {e:?}")))?
            .as_ref()
            .to_string();

        let entry_path = PathBuf::from(&name);
        if escapes(&entry_path) {
            return Err(Error::host(format!(
                "Archive entry escapes the plugin directory: {name}"
            )));
        }

        let target = dst.join(&entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = archive
            .get_entry(entry.wayfinder())
            .map_err(|e| Error::host(format!("Zip entry {name} unreadable: {e:?}")))?;
        let data = contents.data();
        let mut out = fs::File::create(&target)?;
        match entry.compression_method() {
            rawzip::CompressionMethod::Store => {
                io::copy(&mut &*data, &mut out)?;
            }
            rawzip::CompressionMethod::Deflate => {
                io::copy(&mut DeflateDecoder::new(data), &mut out)?;
            }
            method => {
                return Err(Error::Unsupported(format!(
                    "zip compression method {method:?} ({name})"
                )))
            }
        }
        files += 1;
    }

    Ok(files)
}

/// The only entry of `dir`, when that entry is a directory
fn single_child_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?;
    let first = match entries.next() {
        Some(entry) => entry?,
        None => return Ok(None),
    };
    if entries.next().is_some() || !first.file_type()?.is_dir() {
        return Ok(None);
    }
    Ok(Some(first.path()))
}

fn visit(
    name: &str,
    depends: &BTreeMap<PluginName, Vec<PluginName>>,
    seen: &mut HashSet<PluginName>,
    order: &mut Vec<PluginName>,
) {
    if !seen.insert(name.to_string()) {
        return;
    }
    if let Some(dependencies) = depends.get(name) {
        for dependency in dependencies {
            if depends.contains_key(dependency) {
                visit(dependency, depends, seen, order);
            }
        }
    }
    order.push(name.to_string());
}

#[async_trait]
impl PluginStore for LocalHost {
    async fn plugin_exists(&self, name: &str) -> Result<bool> {
        let dir = self.plugin_dir(checked(name)?);
        Ok(tokio::fs::metadata(dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false))
    }

    async fn add_plugin(&self, name: &str, artifact: SourceArtifact) -> Result<()> {
        let name = checked(name)?.to_string();
        let plugins = self.plugins_dir();
        let origin = artifact.origin().to_string();

        let plugin = name.clone();
        let files = blocking(move || install(&plugins, &plugin, &artifact)).await?;

        info!(plugin = %name, origin = %origin, files, "Plugin installed");
        Ok(())
    }

    async fn delete_plugin(&self, name: &str) -> Result<()> {
        let dir = self.plugin_dir(checked(name)?);
        let removed = blocking(move || remove_dir_if_exists(&dir)).await?;
        self.loaded.write().remove(name);

        info!(plugin = %name, removed, "Plugin deleted");
        Ok(())
    }

    async fn get_plugin_metadata(&self, name: &str) -> Result<MetadataDocument> {
        let dir = self.plugin_dir(checked(name)?);
        if !dir.is_dir() {
            return Err(Error::host(format!("Plugin not installed: {name}")));
        }
        read_metadata(&dir)
    }
}

#[async_trait]
impl PluginHost for LocalHost {
    async fn purge_build_cache(&self, name: &str) -> Result<()> {
        let dir = self.cache_dir(checked(name)?);
        let purged = blocking(move || remove_dir_if_exists(&dir)).await?;
        debug!(plugin = %name, purged, "Build cache purged");
        Ok(())
    }

    async fn clear_dependency_records(&self, name: &str) -> Result<()> {
        remove_file_if_exists(&self.records_path(checked(name)?))?;
        Ok(())
    }

    async fn set_installed(&self, name: &str, installed: bool) -> Result<()> {
        let marker = self.marker_path(checked(name)?);
        if installed {
            tokio::fs::write(&marker, b"").await?;
        } else {
            remove_file_if_exists(&marker)?;
        }
        Ok(())
    }

    async fn write_config(&self, name: &str, data: &[u8]) -> Result<()> {
        tokio::fs::write(self.config_path(checked(name)?), data).await?;
        debug!(plugin = %name, bytes = data.len(), "Plugin configuration written");
        Ok(())
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().contains(name)
    }

    async fn reload_config(&self, name: &str) -> Result<()> {
        let data = tokio::fs::read(self.config_path(checked(name)?)).await?;
        let config: Value = serde_yaml::from_slice(&data)
            .map_err(|e| Error::host(format!("Invalid configuration for {name}: {e}")))?;

        info!(
            plugin = %name,
            keys = config.as_object().map_or(0, |map| map.len()),
            "Plugin configuration reloaded"
        );
        Ok(())
    }

    /// Loaded plugins with dependencies ahead of their dependents
    fn load_order(&self) -> Vec<PluginName> {
        let loaded = self.loaded.read().clone();
        let depends: BTreeMap<PluginName, Vec<PluginName>> = loaded
            .into_iter()
            .map(|name| {
                let dependencies = read_metadata(&self.plugin_dir(&name))
                    .map(|metadata| metadata.depends_on)
                    .unwrap_or_default();
                (name, dependencies)
            })
            .collect();

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(depends.len());
        for name in depends.keys() {
            visit(name, &depends, &mut seen, &mut order);
        }
        order
    }

    async fn request_reload(&self, name: &str) -> Result<()> {
        if !self.plugin_dir(checked(name)?).is_dir() {
            return Err(Error::host(format!("Plugin not installed: {name}")));
        }
        self.loaded.write().insert(name.to_string());
        info!(plugin = %name, "Plugin reload requested");
        Ok(())
    }

    fn descriptors(&self) -> Vec<InstalledPluginState> {
        let names = match self.plugin_names() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list plugins");
                return Vec::new();
            }
        };

        names
            .into_iter()
            .map(|name| {
                let config_data = self.config_data(&name);
                let config = if config_data.is_empty() {
                    Value::Null
                } else {
                    serde_yaml::from_slice(&config_data).unwrap_or(Value::Null)
                };
                InstalledPluginState {
                    metadata: read_metadata(&self.plugin_dir(&name)).unwrap_or_default(),
                    prepared: self.marker_path(&name).exists(),
                    activated: self.is_loaded(&name),
                    config,
                    config_data,
                    name,
                }
            })
            .collect()
    }
}

/// Publishes events to the log
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &str, payload: Value) -> Result<()> {
        info!(event, payload = %payload, "Event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn source_tree(dir: &Path) -> PathBuf {
        let src = dir.join("checkout");
        fs::create_dir_all(src.join("src")).unwrap();
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(src.join("src/lib.py"), "print('hi')").unwrap();
        fs::write(
            src.join(METADATA_FILE),
            r#"{"name": "Demo", "version": "1.2.0", "depends_on": ["base"]}"#,
        )
        .unwrap();
        src
    }

    fn tarball(dir: &Path) -> PathBuf {
        let path = dir.join("demo.tar.gz");
        let file = fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        let entries = [
            ("demo-1.0/metadata.json", br#"{"version":"1.0.0"}"#.as_slice()),
            ("demo-1.0/src/main.py", b"print('hi')".as_slice()),
        ];
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    /// Uncompressed zip with the given entries
    fn stored_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for (name, data) in entries {
            let mut crc = flate2::Crc::new();
            crc.update(data);
            let offset = out.len() as u32;

            let mut common = Vec::new();
            common.extend_from_slice(&20u16.to_le_bytes()); // version needed
            common.extend_from_slice(&0u16.to_le_bytes()); // flags
            common.extend_from_slice(&0u16.to_le_bytes()); // stored
            common.extend_from_slice(&0u16.to_le_bytes()); // time
            common.extend_from_slice(&0x21u16.to_le_bytes()); // date
            common.extend_from_slice(&crc.sum().to_le_bytes());
            common.extend_from_slice(&(data.len() as u32).to_le_bytes());
            common.extend_from_slice(&(data.len() as u32).to_le_bytes());
            common.extend_from_slice(&(name.len() as u16).to_le_bytes());
            common.extend_from_slice(&0u16.to_le_bytes()); // extra length

            out.extend_from_slice(&0x04034b50u32.to_le_bytes());
            out.extend_from_slice(&common);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(data);

            central.extend_from_slice(&0x02014b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes()); // version made by
            central.extend_from_slice(&common);
            central.extend_from_slice(&0u16.to_le_bytes()); // comment length
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x06054b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        let path = dir.join("demo.zip");
        fs::write(&path, out).unwrap();
        path
    }

    fn write_plugin(host: &LocalHost, name: &str, depends_on: &[&str]) {
        let dir = host.plugin_dir(name);
        fs::create_dir_all(&dir).unwrap();
        let metadata = serde_json::json!({"version": "1.0.0", "depends_on": depends_on});
        fs::write(dir.join(METADATA_FILE), metadata.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_directory_install_skips_git() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        let artifact = SourceArtifact::at_path(
            ArtifactFormat::Directory,
            source_tree(scratch.path()),
            "https://git.example/demo.git",
        );
        host.add_plugin("demo", artifact).await.unwrap();

        assert!(host.plugin_exists("demo").await.unwrap());
        assert!(host.plugin_dir("demo").join("src/lib.py").is_file());
        assert!(!host.plugin_dir("demo").join(".git").exists());

        let metadata = host.get_plugin_metadata("demo").await.unwrap();
        assert_eq!(metadata.version(), "1.2.0");
        assert_eq!(metadata.depends_on, vec!["base"]);
    }

    #[tokio::test]
    async fn test_tarball_install_strips_top_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        let artifact = SourceArtifact::at_path(
            ArtifactFormat::TarGz,
            tarball(scratch.path()),
            "https://example.com/demo.tar.gz",
        );
        host.add_plugin("demo", artifact).await.unwrap();

        assert!(host.plugin_dir("demo").join("src/main.py").is_file());
        assert_eq!(host.get_plugin_metadata("demo").await.unwrap().version(), "1.0.0");
        assert!(!host.plugins_dir().join(".staging-demo").exists());
    }

    #[tokio::test]
    async fn test_reinstall_replaces_previous_tree() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        write_plugin(&host, "demo", &[]);
        fs::write(host.plugin_dir("demo").join("stale.txt"), "old").unwrap();

        let artifact = SourceArtifact::at_path(
            ArtifactFormat::Directory,
            source_tree(scratch.path()),
            "https://git.example/demo.git",
        );
        host.add_plugin("demo", artifact).await.unwrap();

        assert!(!host.plugin_dir("demo").join("stale.txt").exists());
        assert_eq!(host.get_plugin_metadata("demo").await.unwrap().version(), "1.2.0");
    }

    #[tokio::test]
    async fn test_zip_install_strips_top_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        let path = stored_zip(
            scratch.path(),
            &[
                ("demo-main/", b"".as_slice()),
                ("demo-main/metadata.json", br#"{"version":"2.1.0"}"#.as_slice()),
                ("demo-main/src/main.py", b"print('hi')".as_slice()),
            ],
        );
        let artifact =
            SourceArtifact::at_path(ArtifactFormat::Zip, path, "https://depot.example/demo.zip");
        host.add_plugin("demo", artifact).await.unwrap();

        assert!(host.plugin_dir("demo").join("src/main.py").is_file());
        assert_eq!(host.get_plugin_metadata("demo").await.unwrap().version(), "2.1.0");
        assert!(!host.plugins_dir().join(".staging-demo").exists());
    }

    #[tokio::test]
    async fn test_zip_entries_stay_inside_plugin_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        let path = stored_zip(
            scratch.path(),
            &[
                ("metadata.json", br#"{"version":"1.0.0"}"#.as_slice()),
                ("../evil.txt", b"owned".as_slice()),
            ],
        );
        let artifact =
            SourceArtifact::at_path(ArtifactFormat::Zip, path, "https://depot.example/demo.zip");
        let _ = host.add_plugin("demo", artifact).await;

        assert!(!host.plugins_dir().join("evil.txt").exists());
        assert!(!data.path().join("evil.txt").exists());
        assert!(!host.plugins_dir().join(".staging-demo").exists());
    }

    #[tokio::test]
    async fn test_corrupt_zip_fails_cleanly() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        let path = scratch.path().join("demo.zip");
        fs::write(&path, b"not a zip").unwrap();
        let artifact =
            SourceArtifact::at_path(ArtifactFormat::Zip, path, "https://depot.example/demo.zip");

        assert!(host.add_plugin("demo", artifact).await.is_err());
        assert!(!host.plugin_exists("demo").await.unwrap());
        assert!(!host.plugins_dir().join(".staging-demo").exists());
    }

    #[tokio::test]
    async fn test_invalid_names_are_rejected() {
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();

        for name in ["../escape", "a/b", ".hidden", ""] {
            assert!(host.plugin_exists(name).await.is_err(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_config_roundtrip_and_descriptors() {
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();
        write_plugin(&host, "demo", &[]);

        host.write_config("demo", b"threshold: 3\n").await.unwrap();
        host.set_installed("demo", true).await.unwrap();
        host.request_reload("demo").await.unwrap();
        host.reload_config("demo").await.unwrap();

        let descriptors = host.descriptors();
        assert_eq!(descriptors.len(), 1);
        let demo = &descriptors[0];
        assert_eq!(demo.name, "demo");
        assert!(demo.prepared);
        assert!(demo.activated);
        assert_eq!(demo.config, serde_json::json!({"threshold": 3}));
        assert_eq!(demo.config_data, b"threshold: 3\n");
    }

    #[tokio::test]
    async fn test_invalid_yaml_fails_reload() {
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();
        write_plugin(&host, "demo", &[]);

        host.write_config("demo", b"key: [unterminated").await.unwrap();
        assert!(host.reload_config("demo").await.is_err());
    }

    #[tokio::test]
    async fn test_removal_clears_host_state() {
        let data = tempfile::tempdir().unwrap();
        let host = LocalHost::open(data.path()).unwrap();
        write_plugin(&host, "demo", &[]);
        fs::create_dir_all(host.cache_dir("demo")).unwrap();
        fs::write(host.records_path("demo"), "requests==2.0").unwrap();
        host.set_installed("demo", true).await.unwrap();

        host.purge_build_cache("demo").await.unwrap();
        host.clear_dependency_records("demo").await.unwrap();
        host.set_installed("demo", false).await.unwrap();
        host.delete_plugin("demo").await.unwrap();

        assert!(!host.cache_dir("demo").exists());
        assert!(!host.records_path("demo").exists());
        assert!(!host.marker_path("demo").exists());
        assert!(!host.plugin_exists("demo").await.unwrap());
        assert!(!host.is_loaded("demo"));

        // Removing an absent plugin is not an error
        host.purge_build_cache("demo").await.unwrap();
        host.delete_plugin("demo").await.unwrap();
    }

    #[test]
    fn test_load_order_puts_dependencies_first() {
        let data = tempfile::tempdir().unwrap();
        {
            let host = LocalHost::open(data.path()).unwrap();
            write_plugin(&host, "app", &["storage", "missing"]);
            write_plugin(&host, "storage", &["core"]);
            write_plugin(&host, "core", &["app"]);
        }

        let host = LocalHost::open(data.path()).unwrap();
        let order = host.load_order();

        assert_eq!(order.len(), 3);
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("storage") < position("app"));
    }
}
