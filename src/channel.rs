//! Per-channel semantic role and the energy-sum weight it carries.

use crate::error::{Error, Result};

/// The semantic role of one input channel.
///
/// A channel's role determines the weight `G_c` its mean-square energy
/// contributes to a block's loudness sum (§3). `DUAL_MONO` is the one role
/// that contributes twice: the engine treats a channel tagged `DualMono` as
/// if it were both a left and a right channel of unit weight, so its energy
/// is added into the sum twice rather than once at weight 2.0 — the result
/// is identical but keeps the per-channel accumulation loop uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelRole {
    /// Not part of the loudness sum.
    #[default]
    Unused,
    /// Front-left.
    Left,
    /// Front-right.
    Right,
    /// Front-center.
    Center,
    /// Rear/side-left surround.
    LeftSurround,
    /// Rear/side-right surround.
    RightSurround,
    /// Single channel standing in for both stereo sides.
    DualMono,
}

impl ChannelRole {
    /// The weight `G_c` (§3) a channel of this role contributes to a block's
    /// weighted energy sum. `DualMono` is handled specially by the caller
    /// (see the type's doc comment) and is not meaningfully expressed as a
    /// single weight, so this returns the per-occurrence weight of 1.0; the
    /// doubling happens in [`ChannelMap::weight_contributions`].
    pub fn weight(self) -> f64 {
        match self {
            ChannelRole::Unused => 0.0,
            ChannelRole::Left | ChannelRole::Right | ChannelRole::Center => 1.0,
            ChannelRole::LeftSurround | ChannelRole::RightSurround => 1.41,
            ChannelRole::DualMono => 1.0,
        }
    }

    /// How many times this role's weight is added into the energy sum.
    pub fn occurrences(self) -> u32 {
        match self {
            ChannelRole::DualMono => 2,
            _ => 1,
        }
    }
}

impl TryFrom<u8> for ChannelRole {
    type Error = Error;

    /// Converts a wire/FFI-style role code into a [`ChannelRole`]. In-process
    /// Rust callers construct the enum directly and can never hit this path;
    /// it exists for the boundary a host embedding this engine over a C ABI
    /// would cross, where `set_channel` receives a plain integer.
    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ChannelRole::Unused),
            1 => Ok(ChannelRole::Left),
            2 => Ok(ChannelRole::Right),
            3 => Ok(ChannelRole::Center),
            4 => Ok(ChannelRole::LeftSurround),
            5 => Ok(ChannelRole::RightSurround),
            6 => Ok(ChannelRole::DualMono),
            _ => Err(Error::InvalidChannelRole),
        }
    }
}

/// Assignment of a semantic role to every input channel.
#[derive(Debug, Clone)]
pub struct ChannelMap {
    roles: Vec<ChannelRole>,
}

impl ChannelMap {
    /// Builds the default map for `channels` channels: 0→Left, 1→Right,
    /// 2→Center, 3→Unused, 4→LeftSurround, 5→RightSurround, further indices
    /// default to Unused.
    ///
    /// This is one of the genuine per-channel growth points init/reconfigure
    /// pay for, so it reserves fallibly rather than letting the allocator
    /// abort (§7).
    pub fn default_for(channels: usize) -> Result<Self> {
        let mut roles = Vec::new();
        roles
            .try_reserve_exact(channels)
            .map_err(|_| Error::OutOfMemory)?;
        roles.resize(channels, ChannelRole::Unused);
        const DEFAULTS: [ChannelRole; 6] = [
            ChannelRole::Left,
            ChannelRole::Right,
            ChannelRole::Center,
            ChannelRole::Unused,
            ChannelRole::LeftSurround,
            ChannelRole::RightSurround,
        ];
        for (slot, role) in roles.iter_mut().zip(DEFAULTS.iter()) {
            *slot = *role;
        }
        Ok(Self { roles })
    }

    /// Number of channels this map covers.
    pub fn channels(&self) -> usize {
        self.roles.len()
    }

    /// Role currently assigned to channel `idx`.
    pub fn role(&self, idx: usize) -> Result<ChannelRole> {
        self.roles
            .get(idx)
            .copied()
            .ok_or(Error::InvalidChannelIndex {
                idx,
                channels: self.roles.len(),
            })
    }

    /// Reassigns channel `idx`'s role.
    pub fn set_role(&mut self, idx: usize, role: ChannelRole) -> Result<()> {
        let slot = self
            .roles
            .get_mut(idx)
            .ok_or(Error::InvalidChannelIndex {
                idx,
                channels: self.roles.len(),
            })?;
        *slot = role;
        Ok(())
    }

    /// Total weighted contribution (weight × occurrences) of channel `idx`.
    pub fn weight_contribution(&self, idx: usize) -> f64 {
        let role = self.roles[idx];
        role.weight() * role.occurrences() as f64
    }
}
