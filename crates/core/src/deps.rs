//! External dependency provisioning
//!
//! Fetch-if-missing downloads into the shared cache, archive extraction for
//! nested artifacts, table-driven plugin-local placement, and the shared
//! db4o jar build. Everything here degrades gracefully: a missing
//! dependency means the plugins that need it may fail, not that the run
//! aborts.

use crate::config::{Settings, rules};
use crate::error::{Error, Result};
use crate::process::ProcessRunner;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct DependencyProvisioner<'a> {
    settings: &'a Settings,
}

impl<'a> DependencyProvisioner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Fetch `url` into `target` unless it is already cached. Returns
    /// whether the target is available afterwards; a fetch failure is
    /// logged, not propagated.
    pub fn ensure(&self, url: &str, target: &Path) -> bool {
        if target.exists() {
            debug!("{} already cached", target.display());
            return true;
        }
        match self.fetch(url, target) {
            Ok(()) => {
                info!("downloaded {}", target.display());
                true
            }
            Err(e) => {
                warn!("could not download {}: {e}", target.display());
                false
            }
        }
    }

    fn fetch(&self, url: &str, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let response =
            reqwest::blocking::get(url).map_err(|e| Error::DownloadError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(e.to_string()))?;
        fs::write(target, &bytes)?;
        Ok(())
    }

    /// Fetch every known external dependency. Returns how many are
    /// available in the cache afterwards.
    pub fn fetch_all(&self) -> usize {
        let deps_dir = self.settings.deps_dir();
        rules::EXTERNAL_DEPENDENCIES
            .iter()
            .filter(|(name, url)| self.ensure(url, &deps_dir.join(name)))
            .count()
    }

    /// Extract a `.tar.gz` archive into `target_dir`, returning the
    /// extracted paths.
    pub fn extract_tar_gz(&self, archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(target_dir)?;
        let file = File::open(archive)?;
        let mut tar = Archive::new(GzDecoder::new(file));

        let mut extracted = Vec::new();
        for entry in tar
            .entries()
            .map_err(|e| Error::ArchiveError(format!("{}: {e}", archive.display())))?
        {
            let mut entry =
                entry.map_err(|e| Error::ArchiveError(format!("{}: {e}", archive.display())))?;
            let path = entry
                .path()
                .map_err(|e| Error::ArchiveError(format!("{}: {e}", archive.display())))?
                .into_owned();
            // unpack_in refuses entries that would escape target_dir
            if entry
                .unpack_in(target_dir)
                .map_err(|e| Error::ArchiveError(format!("{}: {e}", path.display())))?
            {
                extracted.push(target_dir.join(path));
            }
        }
        Ok(extracted)
    }

    /// Pull `wrapper.jar` out of the wrapper delta pack into the dependency
    /// cache. The extraction scratch directory is removed afterwards,
    /// whether or not the jar was found.
    pub fn ensure_wrapper_jar(&self) -> bool {
        let target = self.settings.wrapper_jar();
        if target.exists() {
            return true;
        }
        let archive = self.settings.deps_dir().join(rules::WRAPPER_PACK_ARCHIVE);
        if !archive.exists() {
            debug!("wrapper delta pack not cached, skipping wrapper.jar");
            return false;
        }

        let scratch = self.settings.temp_dir().join("wrapper-pack");
        let result = self
            .extract_tar_gz(&archive, &scratch)
            .and_then(|_| {
                let jar = scratch.join(rules::WRAPPER_PACK_JAR_ENTRY);
                if !jar.exists() {
                    return Err(Error::ArchiveError(format!(
                        "{} missing from {}",
                        rules::WRAPPER_PACK_JAR_ENTRY,
                        archive.display()
                    )));
                }
                fs::copy(&jar, &target)?;
                Ok(())
            });
        let _ = fs::remove_dir_all(&scratch);

        match result {
            Ok(()) => {
                info!("extracted wrapper.jar from delta pack");
                true
            }
            Err(e) => {
                warn!("could not extract wrapper.jar: {e}");
                false
            }
        }
    }

    /// Copy cached artifacts to the in-tree locations individual plugin
    /// builds expect. Returns how many placements were made this run.
    pub fn place_plugin_artifacts(&self) -> usize {
        let mut placed = 0;
        for placement in rules::PLACEMENTS {
            let source = self.settings.deps_dir().join(placement.source);
            let dest = self
                .settings
                .projects_dir()
                .join(placement.plugin)
                .join(placement.dest);
            if copy_if_absent(&source, &dest) {
                debug!("placed {} for {}", placement.source, placement.plugin);
                placed += 1;
            }
        }
        placed
    }

    /// Freemail resolves BouncyCastle under the historical name; alias
    /// Fred's bundled jar when present.
    pub fn place_fred_bouncycastle(&self) {
        let fred_dir = self.settings.fred_dir();
        let source = fred_dir.join("build/output/bcprov-jdk15on-1.59.jar");
        let dest = fred_dir.join("lib/bcprov-jdk15on-151.jar");
        if copy_if_absent(&source, &dest) {
            debug!("aliased BouncyCastle jar for Freemail");
        }
    }

    /// Build the shared db4o jar from the source checkout, unless it is
    /// already cached. Compiles into a scratch directory which is removed
    /// afterwards regardless of the outcome.
    pub fn ensure_db4o_jar(&self, runner: &dyn ProcessRunner) -> bool {
        let jar = self.settings.db4o_jar();
        if jar.exists() {
            debug!("{} already built", jar.display());
            return true;
        }

        let src = self.settings.db4o_project_dir().join("src/db4oj");
        if !src.is_dir() {
            debug!("no db4o source checkout, skipping shared jar");
            return false;
        }

        let java_files: Vec<String> = WalkDir::new(&src)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "java"))
            .map(|e| e.path().to_string_lossy().into_owned())
            .collect();
        if java_files.is_empty() {
            warn!("db4o source tree contains no Java files");
            return false;
        }

        let built = self.compile_db4o(runner, &jar, &java_files);
        let _ = fs::remove_dir_all(self.settings.temp_dir().join("db4o-build"));
        built
    }

    fn compile_db4o(&self, runner: &dyn ProcessRunner, jar: &Path, java_files: &[String]) -> bool {
        let classes_dir = self.settings.temp_dir().join("db4o-build");
        if let Err(e) = fs::create_dir_all(&classes_dir) {
            warn!("could not create {}: {e}", classes_dir.display());
            return false;
        }
        if let Some(parent) = jar.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("could not create {}: {e}", parent.display());
                return false;
            }
        }

        let version = &self.settings.java_version;
        let mut javac: Vec<String> = vec![
            "javac".into(),
            "-d".into(),
            classes_dir.to_string_lossy().into_owned(),
            "-source".into(),
            version.clone(),
            "-target".into(),
            version.clone(),
        ];
        javac.extend(java_files.iter().cloned());

        let compile = runner.run(&javac, None);
        if !compile.succeeded() {
            warn!("db4o compilation failed (exit code {})", compile.exit_code);
            return false;
        }

        let jar_cmd: Vec<String> = vec![
            "jar".into(),
            "cf".into(),
            jar.to_string_lossy().into_owned(),
            "-C".into(),
            classes_dir.to_string_lossy().into_owned(),
            ".".into(),
        ];
        let package = runner.run(&jar_cmd, None);
        if !package.succeeded() {
            warn!("db4o jar creation failed (exit code {})", package.exit_code);
            return false;
        }

        info!("built shared db4o jar: {}", jar.display());
        true
    }
}

/// Copy `source` to `dest` only when `dest` does not exist yet; a plugin's
/// own vendored copy is never overwritten.
fn copy_if_absent(source: &Path, dest: &Path) -> bool {
    if dest.exists() || !source.exists() {
        return false;
    }
    let copy = || -> std::io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
        Ok(())
    };
    match copy() {
        Ok(()) => true,
        Err(e) => {
            warn!("could not copy {} to {}: {e}", source.display(), dest.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RunResult;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct RecordingRunner {
        commands: RefCell<Vec<Vec<String>>>,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                commands: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(&self, command: &[String], _working_dir: Option<&Path>) -> RunResult {
            self.commands.borrow_mut().push(command.to_vec());
            RunResult {
                exit_code: 0,
                output: String::new(),
            }
        }
    }

    fn write_tar_gz(path: &Path, entry_name: &str, data: &[u8]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, entry_name, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_ensure_short_circuits_on_cached_target() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        let target = temp.path().join("build/deps/snakeyaml-1.5.jar");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "cached").unwrap();

        // The URL is junk: reaching the network at all would fail the call.
        let provisioner = DependencyProvisioner::new(&settings);
        assert!(provisioner.ensure("not a url at all", &target));
        assert_eq!(fs::read_to_string(&target).unwrap(), "cached");
    }

    #[test]
    fn test_ensure_reports_failure_without_panicking() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        let target = temp.path().join("build/deps/missing.jar");

        let provisioner = DependencyProvisioner::new(&settings);
        assert!(!provisioner.ensure("not a url at all", &target));
        assert!(!target.exists());
    }

    #[test]
    fn test_copy_if_absent_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.jar");
        let dest = temp.path().join("plugin/lib/dep.jar");
        fs::write(&source, "new bytes").unwrap();

        assert!(copy_if_absent(&source, &dest));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new bytes");

        fs::write(&dest, "vendored").unwrap();
        assert!(!copy_if_absent(&source, &dest));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "vendored");
    }

    #[test]
    fn test_extract_tar_gz_returns_extracted_paths() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        let archive = temp.path().join("pack.tar.gz");
        write_tar_gz(&archive, "pack/lib/wrapper.jar", b"jar bytes");

        let provisioner = DependencyProvisioner::new(&settings);
        let out_dir = temp.path().join("out");
        let extracted = provisioner.extract_tar_gz(&archive, &out_dir).unwrap();

        assert_eq!(extracted, vec![out_dir.join("pack/lib/wrapper.jar")]);
        assert_eq!(
            fs::read(out_dir.join("pack/lib/wrapper.jar")).unwrap(),
            b"jar bytes"
        );
    }

    #[test]
    fn test_ensure_wrapper_jar_pulls_nested_artifact_and_cleans_scratch() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        let deps_dir = settings.deps_dir();
        fs::create_dir_all(&deps_dir).unwrap();
        write_tar_gz(
            &deps_dir.join(rules::WRAPPER_PACK_ARCHIVE),
            rules::WRAPPER_PACK_JAR_ENTRY,
            b"wrapper jar",
        );

        let provisioner = DependencyProvisioner::new(&settings);
        assert!(provisioner.ensure_wrapper_jar());
        assert_eq!(fs::read(settings.wrapper_jar()).unwrap(), b"wrapper jar");
        assert!(!settings.temp_dir().join("wrapper-pack").exists());

        // Second call hits the cache.
        assert!(provisioner.ensure_wrapper_jar());
    }

    #[test]
    fn test_place_plugin_artifacts_is_table_driven() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        let deps_dir = settings.deps_dir();
        fs::create_dir_all(&deps_dir).unwrap();
        fs::write(deps_dir.join("snakeyaml-1.5.jar"), "yaml").unwrap();
        fs::write(deps_dir.join("xom-1.3.8.jar"), "xom").unwrap();
        fs::create_dir_all(settings.projects_dir().join("plugin-Library")).unwrap();
        fs::create_dir_all(settings.projects_dir().join("plugin-Echo")).unwrap();

        let provisioner = DependencyProvisioner::new(&settings);
        assert_eq!(provisioner.place_plugin_artifacts(), 2);
        assert!(
            settings
                .projects_dir()
                .join("plugin-Library/tmp/snakeyaml-1.5.jar")
                .exists()
        );
        assert!(
            settings
                .projects_dir()
                .join("plugin-Echo/lib/xom-1.2b2.jar")
                .exists()
        );

        // Re-running places nothing new.
        assert_eq!(provisioner.place_plugin_artifacts(), 0);
    }

    #[test]
    fn test_ensure_db4o_jar_skips_when_cached() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        fs::create_dir_all(settings.deps_dir()).unwrap();
        fs::write(settings.db4o_jar(), "jar").unwrap();

        let runner = RecordingRunner::new();
        let provisioner = DependencyProvisioner::new(&settings);
        assert!(provisioner.ensure_db4o_jar(&runner));
        assert!(runner.commands.borrow().is_empty());
    }

    #[test]
    fn test_ensure_db4o_jar_compiles_then_packages() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::new(temp.path());
        let src = settings.db4o_project_dir().join("src/db4oj/com/db4o");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("Db4o.java"), "class Db4o {}").unwrap();

        let runner = RecordingRunner::new();
        let provisioner = DependencyProvisioner::new(&settings);
        assert!(provisioner.ensure_db4o_jar(&runner));

        let commands = runner.commands.borrow();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0][0], "javac");
        assert_eq!(commands[1][0], "jar");
        assert!(!settings.temp_dir().join("db4o-build").exists());
    }
}
