//! RF link budget: free-space path loss, atmospheric and rain attenuation,
//! SNR, and the capped Shannon data rate per band preset.

use serde::{Deserialize, Serialize};

use crate::{ContactError, Result};

const SPEED_OF_LIGHT_M_S: f64 = 3.0e8;
const BOLTZMANN_J_K: f64 = 1.38e-23;

/// Effective atmosphere thickness for the absorption model, km.
const ATMOSPHERE_THICKNESS_KM: f64 = 50.0;

/// Fraction of Shannon capacity achievable with practical coding.
const CODING_EFFICIENCY: f64 = 0.75;

/// Named RF band presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RfBand {
    LBand,
    SBand,
    CBand,
    KuBand,
    KaBand,
    VBand,
}

impl RfBand {
    pub const ALL: [RfBand; 6] = [
        RfBand::LBand,
        RfBand::SBand,
        RfBand::CBand,
        RfBand::KuBand,
        RfBand::KaBand,
        RfBand::VBand,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "l-band" => Ok(RfBand::LBand),
            "s-band" => Ok(RfBand::SBand),
            "c-band" => Ok(RfBand::CBand),
            "ku-band" => Ok(RfBand::KuBand),
            "ka-band" => Ok(RfBand::KaBand),
            "v-band" => Ok(RfBand::VBand),
            other => Err(ContactError::UnknownBand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RfBand::LBand => "l-band",
            RfBand::SBand => "s-band",
            RfBand::CBand => "c-band",
            RfBand::KuBand => "ku-band",
            RfBand::KaBand => "ka-band",
            RfBand::VBand => "v-band",
        }
    }

    /// Practical per-band throughput ceiling, Mbps.
    pub fn rate_cap_mbps(&self) -> f64 {
        match self {
            RfBand::LBand => 10.0,
            RfBand::SBand => 50.0,
            RfBand::CBand => 200.0,
            RfBand::KuBand => 500.0,
            RfBand::KaBand => 2000.0,
            RfBand::VBand => 10_000.0,
        }
    }
}

impl Default for RfBand {
    fn default() -> Self {
        RfBand::SBand
    }
}

/// RF parameters of one link direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkBudget {
    pub band: RfBand,
    pub frequency_hz: f64,
    pub tx_power_w: f64,
    pub tx_gain_dbi: f64,
    pub rx_gain_dbi: f64,
    pub noise_temp_k: f64,
    pub bandwidth_hz: f64,
    pub required_snr_db: f64,
}

/// SNR and achievable rate for one geometry sample. A rate of zero means the
/// link margin is insufficient; that is a metric, never an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkAssessment {
    pub snr_db: f64,
    pub data_rate_mbps: f64,
}

impl LinkBudget {
    pub fn preset(band: RfBand) -> Self {
        match band {
            RfBand::LBand => Self {
                band,
                frequency_hz: 1.575e9,
                tx_power_w: 50.0,
                tx_gain_dbi: 12.0,
                rx_gain_dbi: 35.0,
                noise_temp_k: 180.0,
                bandwidth_hz: 20e6,
                required_snr_db: 6.0,
            },
            RfBand::SBand => Self {
                band,
                frequency_hz: 2.4e9,
                tx_power_w: 20.0,
                tx_gain_dbi: 18.0,
                rx_gain_dbi: 40.0,
                noise_temp_k: 150.0,
                bandwidth_hz: 10e6,
                required_snr_db: 8.0,
            },
            RfBand::CBand => Self {
                band,
                frequency_hz: 6.0e9,
                tx_power_w: 15.0,
                tx_gain_dbi: 25.0,
                rx_gain_dbi: 50.0,
                noise_temp_k: 120.0,
                bandwidth_hz: 36e6,
                required_snr_db: 10.0,
            },
            RfBand::KuBand => Self {
                band,
                frequency_hz: 14.0e9,
                tx_power_w: 10.0,
                tx_gain_dbi: 35.0,
                rx_gain_dbi: 55.0,
                noise_temp_k: 100.0,
                bandwidth_hz: 50e6,
                required_snr_db: 12.0,
            },
            RfBand::KaBand => Self {
                band,
                frequency_hz: 20.0e9,
                tx_power_w: 5.0,
                tx_gain_dbi: 42.0,
                rx_gain_dbi: 60.0,
                noise_temp_k: 80.0,
                bandwidth_hz: 250e6,
                required_snr_db: 15.0,
            },
            RfBand::VBand => Self {
                band,
                frequency_hz: 60.0e9,
                tx_power_w: 2.0,
                tx_gain_dbi: 50.0,
                rx_gain_dbi: 65.0,
                noise_temp_k: 200.0,
                bandwidth_hz: 1000e6,
                required_snr_db: 18.0,
            },
        }
    }

    /// Evaluate the budget at the given slant range and elevation.
    pub fn evaluate(&self, range_km: f64, elevation_deg: f64) -> LinkAssessment {
        let wavelength_m = SPEED_OF_LIGHT_M_S / self.frequency_hz;
        let path_loss_db =
            20.0 * (4.0 * std::f64::consts::PI * range_km * 1000.0 / wavelength_m).log10();
        let total_loss_db =
            path_loss_db + self.atmospheric_loss_db(elevation_deg) + self.rain_loss_db(elevation_deg);

        let eirp_dbw = 10.0 * self.tx_power_w.log10() + self.tx_gain_dbi;
        let rx_power_dbw = eirp_dbw - total_loss_db + self.rx_gain_dbi;
        let noise_power_dbw =
            10.0 * (BOLTZMANN_J_K * self.noise_temp_k * self.bandwidth_hz).log10();
        let snr_db = rx_power_dbw - noise_power_dbw;

        let data_rate_mbps = if snr_db >= self.required_snr_db {
            let snr_linear = 10f64.powf(snr_db / 10.0);
            let shannon_mbps = self.bandwidth_hz * (1.0 + snr_linear).log2() / 1e6;
            (shannon_mbps * CODING_EFFICIENCY).min(self.band.rate_cap_mbps())
        } else {
            0.0
        };

        LinkAssessment {
            snr_db,
            data_rate_mbps,
        }
    }

    /// Frequency-dependent atmospheric absorption scaled by the air path.
    fn atmospheric_loss_db(&self, elevation_deg: f64) -> f64 {
        let absorption_db_km = if self.frequency_hz < 2e9 {
            0.005
        } else if self.frequency_hz < 8e9 {
            0.01
        } else if self.frequency_hz < 20e9 {
            0.02
        } else if self.frequency_hz < 40e9 {
            0.05
        } else {
            0.15
        };

        let elevation_rad = elevation_deg.max(1.0).to_radians();
        absorption_db_km * ATMOSPHERE_THICKNESS_KM / elevation_rad.sin()
    }

    /// Simplified ITU-style rain fade, negligible below 10 GHz.
    fn rain_loss_db(&self, elevation_deg: f64) -> f64 {
        if self.frequency_hz < 10e9 {
            return 0.1;
        }
        let base_db = if self.frequency_hz < 20e9 {
            2.0
        } else if self.frequency_hz < 40e9 {
            5.0
        } else {
            15.0
        };
        let elevation_factor = elevation_deg.max(5.0).to_radians().sin();
        base_db * (1.0 - elevation_factor * 0.5)
    }
}

/// Term-by-term decomposition of one budget evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkBudgetBreakdown {
    pub eirp_dbw: f64,
    pub path_loss_db: f64,
    pub atmospheric_loss_db: f64,
    pub rain_loss_db: f64,
    pub rx_power_dbw: f64,
    pub noise_power_dbw: f64,
    pub snr_db: f64,
    pub required_snr_db: f64,
    pub data_rate_mbps: f64,
    pub link_viable: bool,
}

impl LinkBudget {
    /// Full decomposition of the budget at one geometry, for diagnostics.
    pub fn breakdown(&self, range_km: f64, elevation_deg: f64) -> LinkBudgetBreakdown {
        let wavelength_m = SPEED_OF_LIGHT_M_S / self.frequency_hz;
        let path_loss_db =
            20.0 * (4.0 * std::f64::consts::PI * range_km * 1000.0 / wavelength_m).log10();
        let atmospheric_loss_db = self.atmospheric_loss_db(elevation_deg);
        let rain_loss_db = self.rain_loss_db(elevation_deg);

        let eirp_dbw = 10.0 * self.tx_power_w.log10() + self.tx_gain_dbi;
        let rx_power_dbw =
            eirp_dbw - (path_loss_db + atmospheric_loss_db + rain_loss_db) + self.rx_gain_dbi;
        let noise_power_dbw =
            10.0 * (BOLTZMANN_J_K * self.noise_temp_k * self.bandwidth_hz).log10();
        let assessment = self.evaluate(range_km, elevation_deg);

        LinkBudgetBreakdown {
            eirp_dbw,
            path_loss_db,
            atmospheric_loss_db,
            rain_loss_db,
            rx_power_dbw,
            noise_power_dbw,
            snr_db: assessment.snr_db,
            required_snr_db: self.required_snr_db,
            data_rate_mbps: assessment.data_rate_mbps,
            link_viable: assessment.data_rate_mbps > 0.0,
        }
    }
}
