//! Machine profiles: the declarative JSON documents that pick which
//! module fills each slot of a machine.
//!
//! ```json
//! {
//!   "machine": "atari-st",
//!   "display_name": "Atari 520ST",
//!   "year": 1985,
//!   "memory": { "ram_kb": 1024, "tos_file": "tos104uk.img" },
//!   "components": {
//!     "cpu": { "file": "cpu68000.ebin", "clock_hz": 8000000 },
//!     "mmu": { "file": "mmu.ebin" },
//!     "video": { "file": "shifter.ebin" },
//!     "audio": [ { "file": "ym2149.ebin", "role": "psg" } ],
//!     "io": [ { "file": "mfp68901.ebin", "role": "mfp" } ]
//!   }
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile not found: {0}")]
    NotFound(std::path::PathBuf),
    #[error("reading profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing profile: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("profile {machine:?}: {reason}")]
    Invalid { machine: String, reason: String },
}

/// Video timing standard; selects the GLUE frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStandard {
    #[default]
    Pal,
    Ntsc,
}

/// One slot assignment.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotEntry {
    /// Module file name; its stem also names the built-in fallback.
    pub file: String,
    #[serde(default)]
    pub clock_hz: Option<u32>,
    /// Wiring tag: which bus address block and input lines the machine
    /// gives the module. Defaults to the file stem.
    #[serde(default)]
    pub role: Option<String>,
    /// Optional slots are skipped when the module cannot be found.
    #[serde(default)]
    pub optional: bool,
}

impl SlotEntry {
    /// The wiring role: explicit tag or the file stem.
    #[must_use]
    pub fn role(&self) -> &str {
        if let Some(role) = &self.role {
            return role;
        }
        self.file.split('.').next().unwrap_or(&self.file)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryProfile {
    pub ram_kb: u32,
    pub tos_file: String,
    #[serde(default = "default_true")]
    pub tos_required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentsProfile {
    pub cpu: SlotEntry,
    pub mmu: SlotEntry,
    pub video: SlotEntry,
    #[serde(default)]
    pub blitter: Option<SlotEntry>,
    #[serde(default)]
    pub audio: Vec<SlotEntry>,
    #[serde(default)]
    pub io: Vec<SlotEntry>,
}

/// A parsed machine profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub machine: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub year: u32,
    #[serde(default)]
    pub video_standard: VideoStandard,
    pub memory: MemoryProfile,
    pub components: ComponentsProfile,
}

impl Profile {
    pub fn from_str(text: &str) -> Result<Self, ProfileError> {
        let profile: Self = serde_json::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_path(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProfileError::NotFound(path.to_path_buf())
            } else {
                ProfileError::Io(e)
            }
        })?;
        Self::from_str(&text)
    }

    fn validate(&self) -> Result<(), ProfileError> {
        let invalid = |reason: String| ProfileError::Invalid {
            machine: self.machine.clone(),
            reason,
        };
        if !(128..=4096).contains(&self.memory.ram_kb) {
            return Err(invalid(format!(
                "ram_kb {} outside 128..=4096",
                self.memory.ram_kb
            )));
        }
        if self.memory.tos_file.is_empty() && self.memory.tos_required {
            return Err(invalid("tos_file empty but tos_required".into()));
        }
        for slot in [&self.components.cpu, &self.components.mmu, &self.components.video] {
            if slot.file.is_empty() {
                return Err(invalid("required slot with empty file".into()));
            }
        }
        Ok(())
    }

    /// RAM size in bytes.
    #[must_use]
    pub fn ram_bytes(&self) -> u32 {
        self.memory.ram_kb * 1024
    }

    /// CPU clock: the CPU slot's override or the ST's 8 MHz.
    #[must_use]
    pub fn cpu_clock_hz(&self) -> u32 {
        self.components.cpu.clock_hz.unwrap_or(8_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ST: &str = r#"{
        "machine": "atari-st",
        "display_name": "Atari 520ST",
        "description": "stock 520ST",
        "year": 1985,
        "memory": { "ram_kb": 512, "tos_file": "tos104.img" },
        "components": {
            "cpu": { "file": "cpu68000.ebin", "clock_hz": 8000000 },
            "mmu": { "file": "mmu.ebin" },
            "video": { "file": "shifter.ebin" },
            "audio": [ { "file": "ym2149.ebin", "role": "psg" } ],
            "io": [
                { "file": "mfp68901.ebin", "role": "mfp" },
                { "file": "acia.ebin" },
                { "file": "dma-fdc.ebin", "role": "dma", "optional": true }
            ]
        }
    }"#;

    #[test]
    fn parses_a_complete_profile() {
        let profile = Profile::from_str(ST).expect("valid profile");
        assert_eq!(profile.machine, "atari-st");
        assert_eq!(profile.ram_bytes(), 512 * 1024);
        assert_eq!(profile.cpu_clock_hz(), 8_000_000);
        assert_eq!(profile.video_standard, VideoStandard::Pal);
        assert_eq!(profile.components.io.len(), 3);
        assert!(profile.components.io[2].optional);
        assert!(profile.memory.tos_required, "defaults on");
    }

    #[test]
    fn role_defaults_to_file_stem() {
        let profile = Profile::from_str(ST).expect("valid profile");
        assert_eq!(profile.components.io[0].role(), "mfp");
        assert_eq!(profile.components.io[1].role(), "acia");
    }

    #[test]
    fn missing_required_slot_is_rejected() {
        let text = ST.replace(r#""mmu": { "file": "mmu.ebin" },"#, "");
        assert!(matches!(
            Profile::from_str(&text),
            Err(ProfileError::Parse(_))
        ));
    }

    #[test]
    fn absurd_ram_size_is_rejected() {
        let text = ST.replace(r#""ram_kb": 512"#, r#""ram_kb": 65536"#);
        assert!(matches!(
            Profile::from_str(&text),
            Err(ProfileError::Invalid { .. })
        ));
    }

    #[test]
    fn video_standard_is_selectable() {
        let text = ST.replace(
            r#""year": 1985,"#,
            r#""year": 1985, "video_standard": "ntsc","#,
        );
        let profile = Profile::from_str(&text).expect("valid profile");
        assert_eq!(profile.video_standard, VideoStandard::Ntsc);
    }
}
