//! Static provisioning policy, keyed by plugin name.
//!
//! These tables drive the environment provisioner and the per-plugin build
//! strategies. They are configuration, not derived state; the lists reflect
//! the final known-good set for the plugin tree this tool targets.

/// Plugin whose Gradle wrapper is copied into plugins that lack one.
pub const WRAPPER_DONOR: &str = "plugin-FlogHelper";

/// Gradle plugins shipped without their own wrapper.
pub const PLUGINS_NEEDING_WRAPPER: &[&str] = &["plugin-WebOfTrust", "plugin-Freetalk"];

/// Plugins whose test sources do not compile on a modern JDK; their builds
/// skip test compilation entirely.
pub const PLUGINS_SKIPPING_TESTS: &[&str] = &["plugin-WebOfTrust", "plugin-Freetalk"];

/// Ant plugins that compile the shared db4o source tree (symlinked in).
pub const ANT_PLUGINS_NEEDING_DB4O: &[&str] = &["plugin-XMLLibrarian", "plugin-XMLSpider"];

/// Ant plugins that only need the prebuilt db4o jar on the tool classpath.
pub const ANT_PLUGINS_NEEDING_DB4O_JAR_ONLY: &[&str] = &["plugin-Freereader"];

/// Gradle plugins that expect a db4o jar inside their tree.
pub const GRADLE_PLUGINS_NEEDING_DB4O: &[&str] = &["plugin-WebOfTrust", "plugin-Freetalk"];

/// Shared db4o source checkout under `projects/`.
pub const DB4O_PROJECT: &str = "db4o-7.4";

pub const DB4O_JAR_NAME: &str = "db4o-7.4.jar";

/// Gradle wrapper file set copied from the donor plugin. The entry-point
/// script comes first and is the one marked executable.
pub const WRAPPER_FILES: &[&str] = &[
    "gradlew",
    "gradlew.bat",
    "gradle/wrapper/gradle-wrapper.jar",
    "gradle/wrapper/gradle-wrapper.properties",
];

/// Externally fetched artifacts: (cache file name, URL). Each is fetched at
/// most once per cache lifetime; there is no checksum verification.
pub const EXTERNAL_DEPENDENCIES: &[(&str, &str)] = &[
    (
        "snakeyaml-1.5.jar",
        "https://repo1.maven.org/maven2/org/yaml/snakeyaml/1.5/snakeyaml-1.5.jar",
    ),
    (
        "xom-1.3.8.jar",
        "https://repo1.maven.org/maven2/xom/xom/1.3.8/xom-1.3.8.jar",
    ),
    (
        "bcprov-jdk15on-1.70.jar",
        "https://repo1.maven.org/maven2/org/bouncycastle/bcprov-jdk15on/1.70/bcprov-jdk15on-1.70.jar",
    ),
    (
        "wrapper-delta-pack-3.6.2.tar.gz",
        "https://download.tanukisoftware.com/wrapper/3.6.2/wrapper-delta-pack-3.6.2.tar.gz",
    ),
];

/// Archive carrying the Tanuki wrapper jar, and the entry to pull out of it.
pub const WRAPPER_PACK_ARCHIVE: &str = "wrapper-delta-pack-3.6.2.tar.gz";
pub const WRAPPER_PACK_JAR_ENTRY: &str = "wrapper-delta-pack-3.6.2/lib/wrapper.jar";

/// A fetched artifact copied to the location one plugin's build expects.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    /// Owning plugin directory name.
    pub plugin: &'static str,
    /// Source file name inside the shared dependency cache.
    pub source: &'static str,
    /// Destination path relative to the plugin directory.
    pub dest: &'static str,
}

/// Plugin-local dependency placements. Applying one is copy-if-absent: a
/// plugin's own vendored copy is never clobbered.
pub const PLACEMENTS: &[Placement] = &[
    Placement {
        plugin: "plugin-Library",
        source: "snakeyaml-1.5.jar",
        dest: "tmp/snakeyaml-1.5.jar",
    },
    Placement {
        plugin: "plugin-Echo",
        source: "xom-1.3.8.jar",
        dest: "lib/xom-1.2b2.jar",
    },
];

/// True when the default Ant invocation for `plugin` should put the shared
/// db4o jar on the tool classpath.
pub fn ant_needs_db4o_classpath(plugin: &str) -> bool {
    ANT_PLUGINS_NEEDING_DB4O.contains(&plugin)
        || ANT_PLUGINS_NEEDING_DB4O_JAR_ONLY.contains(&plugin)
}
