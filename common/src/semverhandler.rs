use semver::Version;

/// Cluster version as advertised by the platform, parsed leniently
///
/// Accepts `v1.22`, `1.22.3`, ` V4.11-SNAPSHOT ` and similar: missing minor/patch parts are
/// zero and anything that is not a numeric component is ignored.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Semver {
    pub version: Version,
}

impl Semver {
    pub fn parse(str: &str) -> Option<Self> {
        let trimmed = str.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if let Ok(version) = Version::parse(trimmed) {
            return Some(Self { version });
        }
        let mut parts = [0u64; 3];
        let mut found = 0;
        for (i, part) in trimmed.split('.').take(3).enumerate() {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts[i] = digits.parse().ok()?;
            found += 1;
            if digits.len() != part.len() {
                break;
            }
        }
        if found == 0 {
            return None;
        }
        Some(Self {
            version: Version::new(parts[0], parts[1], parts[2]),
        })
    }

    pub fn at_least(&self, major: u64, minor: u64) -> bool {
        (self.version.major, self.version.minor) >= (major, minor)
    }
}
