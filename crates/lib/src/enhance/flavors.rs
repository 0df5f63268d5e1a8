//! Flavor names understood by the built-in descriptions.

use crate::target::Flavor;

pub const SRC_JAR: Flavor = Flavor::from_static("src_jar");
pub const JAVADOC: Flavor = Flavor::from_static("javadoc");
pub const MAVEN_JAR: Flavor = Flavor::from_static("maven_jar");

/// Class ABI of a JVM library.
pub const ABI: Flavor = Flavor::from_static("abi");
pub const DUMMY_R_DOT_JAVA: Flavor = Flavor::from_static("dummy_r_dot_java");

pub const AAR_ANDROID_MANIFEST: Flavor = Flavor::from_static("aar_android_manifest");
pub const AAR_ASSEMBLE_ASSETS: Flavor = Flavor::from_static("aar_assemble_assets");
pub const AAR_ASSEMBLE_RESOURCE: Flavor = Flavor::from_static("aar_assemble_resource");
pub const AAR_ANDROID_RESOURCE: Flavor = Flavor::from_static("aar_android_resource");
