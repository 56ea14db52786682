//! Network-dependent consensus parameters
//!
//! The parameter table is immutable after construction and freely shared.
//! Fork activation heights follow the deployment history of each chain;
//! on regtest everything is active from genesis.

use crate::constants::{HALVING_INTERVAL, INITIAL_SUBSIDY};
use serde::{Deserialize, Serialize};

/// Chain selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// The four magic bytes prefixed to every P2P message on this chain,
    /// as a little-endian u32.
    pub fn magic(self) -> u32 {
        match self {
            Network::Mainnet => 0xd9b4_bef9,
            Network::Testnet => 0x0709_110b,
            Network::Regtest => 0xdab5_bffa,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet => 18333,
            Network::Regtest => 18444,
        }
    }

    pub fn params(self) -> &'static ConsensusParams {
        ConsensusParams::for_network(self)
    }
}

/// Consensus rule constants for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusParams {
    pub network: Network,
    /// Height at which BIP16 (P2SH) rules apply.
    pub bip16_height: u64,
    /// Height at which BIP34 (coinbase height commitment) applies.
    pub bip34_height: u64,
    /// Height at which BIP65 (CHECKLOCKTIMEVERIFY) applies.
    pub bip65_height: u64,
    /// Height at which BIP66 (strict DER) applies.
    pub bip66_height: u64,
    /// Height at which BIP68/112/113 (relative locks) apply.
    pub csv_height: u64,
    /// Height at which BIP141/143 (segregated witness) applies.
    pub segwit_height: u64,
    /// Height at which BIP341/342 (taproot) applies.
    pub taproot_height: u64,
    /// Proof-of-work limit in compact form (the minimum difficulty).
    pub pow_limit_bits: u32,
    /// Expected seconds between blocks.
    pub pow_target_spacing: u64,
    /// Blocks between difficulty retargets.
    pub difficulty_adjustment_interval: u64,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u64,
}

static MAINNET: ConsensusParams = ConsensusParams {
    network: Network::Mainnet,
    bip16_height: 173_805,
    bip34_height: 227_931,
    bip65_height: 388_381,
    bip66_height: 363_725,
    csv_height: 419_328,
    segwit_height: 481_824,
    taproot_height: 709_632,
    pow_limit_bits: 0x1d00_ffff,
    pow_target_spacing: 600,
    difficulty_adjustment_interval: 2016,
    subsidy_halving_interval: HALVING_INTERVAL,
};

static TESTNET: ConsensusParams = ConsensusParams {
    network: Network::Testnet,
    bip16_height: 514,
    bip34_height: 21_111,
    bip65_height: 581_885,
    bip66_height: 330_776,
    csv_height: 770_112,
    segwit_height: 834_624,
    taproot_height: 2_011_968,
    pow_limit_bits: 0x1d00_ffff,
    pow_target_spacing: 600,
    difficulty_adjustment_interval: 2016,
    subsidy_halving_interval: HALVING_INTERVAL,
};

static REGTEST: ConsensusParams = ConsensusParams {
    network: Network::Regtest,
    bip16_height: 0,
    bip34_height: 0,
    bip65_height: 0,
    bip66_height: 0,
    csv_height: 0,
    segwit_height: 0,
    taproot_height: 0,
    pow_limit_bits: 0x207f_ffff,
    pow_target_spacing: 600,
    difficulty_adjustment_interval: 2016,
    subsidy_halving_interval: 150,
};

impl ConsensusParams {
    pub fn for_network(network: Network) -> &'static ConsensusParams {
        match network {
            Network::Mainnet => &MAINNET,
            Network::Testnet => &TESTNET,
            Network::Regtest => &REGTEST,
        }
    }

    /// Block subsidy at `height`: 50 BTC halved every interval, zero once
    /// the shift exhausts 64 bits.
    pub fn block_subsidy(&self, height: u64) -> i64 {
        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 64 {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }

    pub fn is_bip16_active(&self, height: u64) -> bool {
        height >= self.bip16_height
    }

    pub fn is_bip65_active(&self, height: u64) -> bool {
        height >= self.bip65_height
    }

    pub fn is_bip66_active(&self, height: u64) -> bool {
        height >= self.bip66_height
    }

    pub fn is_csv_active(&self, height: u64) -> bool {
        height >= self.csv_height
    }

    pub fn is_segwit_active(&self, height: u64) -> bool {
        height >= self.segwit_height
    }

    pub fn is_taproot_active(&self, height: u64) -> bool {
        height >= self.taproot_height
    }

    /// Script verification flags in force at `height` on this chain.
    pub fn script_flags_at(&self, height: u64) -> u32 {
        use crate::script::flags::*;

        let mut flags = VERIFY_NONE;
        if self.is_bip16_active(height) {
            flags |= VERIFY_P2SH;
        }
        if self.is_bip66_active(height) {
            flags |= VERIFY_DERSIG;
        }
        if self.is_bip65_active(height) {
            flags |= VERIFY_CHECKLOCKTIMEVERIFY;
        }
        if self.is_csv_active(height) {
            flags |= VERIFY_CHECKSEQUENCEVERIFY;
        }
        if self.is_segwit_active(height) {
            flags |= VERIFY_WITNESS | VERIFY_NULLDUMMY;
        }
        if self.is_taproot_active(height) {
            flags |= VERIFY_TAPROOT;
        }
        flags
    }
}
