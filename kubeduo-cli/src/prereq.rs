//! Prerequisite checker for kubeduo
//!
//! Validates that the host tools the orchestrator shells out to are
//! installed with usable versions.

use std::path::PathBuf;

/// A host binary kubeduo depends on.
#[derive(Debug, Clone)]
pub struct BinarySpec {
    pub name: &'static str,
    /// Arguments that make the binary print its version.
    pub version_args: &'static [&'static str],
    /// semver requirement, e.g. ">=1.12.0"
    pub version: &'static str,
    pub install_hint: &'static str,
}

pub const REQUIRED_BINS: &[BinarySpec] = &[BinarySpec {
    name: "multipass",
    version_args: &["version"],
    version: ">=1.12.0",
    install_hint: "sudo snap install multipass (or see https://multipass.run/install)",
}];

pub const OPTIONAL_BINS: &[BinarySpec] = &[BinarySpec {
    name: "kubectl",
    version_args: &["version", "--client"],
    version: ">=1.28.0",
    install_hint: "needed to use the cluster from this host: https://kubernetes.io/docs/tasks/tools/",
}];

/// Result of prerequisite check for a single binary
#[derive(Debug)]
pub struct BinaryCheck {
    pub name: String,
    pub found: bool,
    pub installed_version: Option<String>,
    pub required_version: String,
    pub meets_requirement: bool,
    pub path: Option<PathBuf>,
    pub install_hint: Option<String>,
}

/// Overall prerequisite check result
#[derive(Debug)]
pub struct PrereqResult {
    pub required: Vec<BinaryCheck>,
    pub optional: Vec<BinaryCheck>,
    pub all_required_met: bool,
}

impl PrereqResult {
    pub fn missing_required(&self) -> Vec<&BinaryCheck> {
        self.required
            .iter()
            .filter(|b| !b.found || !b.meets_requirement)
            .collect()
    }

    pub fn missing_optional(&self) -> Vec<&BinaryCheck> {
        self.optional
            .iter()
            .filter(|b| !b.found || !b.meets_requirement)
            .collect()
    }
}

fn find_binary(name: &str) -> Option<PathBuf> {
    let output = duct::cmd("which", [name])
        .stdout_capture()
        .stderr_null()
        .unchecked()
        .run()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    Some(PathBuf::from(path.trim()))
}

fn get_version(spec: &BinarySpec) -> Option<String> {
    let output = duct::cmd(spec.name, spec.version_args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    extract_version(&String::from_utf8_lossy(&output.stdout))
}

/// Extract semantic version from version output
///   "multipass   1.13.1+mac" -> "1.13.1"
///   "Client Version: v1.30.2" -> "1.30.2"
fn extract_version(output: &str) -> Option<String> {
    let re = regex::Regex::new(r"v?(\d+\.\d+\.\d+)").ok()?;
    re.captures(output)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn version_meets_requirement(installed: &str, requirement: &str) -> Result<bool, semver::Error> {
    let req = semver::VersionReq::parse(requirement)?;
    let installed = semver::Version::parse(installed.trim())?;
    Ok(req.matches(&installed))
}

fn check_binary(spec: &BinarySpec) -> BinaryCheck {
    let path = find_binary(spec.name);
    let found = path.is_some();

    let (installed_version, meets_requirement) = if found {
        match get_version(spec) {
            Some(version) => {
                let meets = version_meets_requirement(&version, spec.version).unwrap_or(false);
                (Some(version), meets)
            }
            // Found but version unknown: let the run itself find out
            None => (Some("unknown".to_string()), true),
        }
    } else {
        (None, false)
    };

    BinaryCheck {
        name: spec.name.to_string(),
        found,
        installed_version,
        required_version: spec.version.to_string(),
        meets_requirement,
        path,
        install_hint: Some(spec.install_hint.to_string()),
    }
}

pub fn check_prerequisites() -> PrereqResult {
    let required: Vec<BinaryCheck> = REQUIRED_BINS.iter().map(check_binary).collect();
    let optional = OPTIONAL_BINS.iter().map(check_binary).collect();
    let all_required_met = required.iter().all(|c| c.found && c.meets_requirement);
    tracing::debug!("Prerequisites checked: all required met = {all_required_met}");

    PrereqResult {
        required,
        optional,
        all_required_met,
    }
}
