//! VIP subscription price tables
//!
//! Prices are externally supplied configuration; the defaults mirror the
//! production price list. Stars map to the platform's micro-payment
//! currency, points are the internal currency.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// One purchasable VIP package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipPackage {
    /// Subscription length in days
    pub days: u32,
    /// Price in stars
    pub stars_price: u64,
    /// Price in points
    pub points_price: u64,
}

/// VIP price table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VipSettings {
    pub packages: Vec<VipPackage>,
}

impl Default for VipSettings {
    fn default() -> Self {
        Self {
            packages: vec![
                VipPackage { days: 1, stars_price: 10, points_price: 100 },
                VipPackage { days: 2, stars_price: 15, points_price: 180 },
                VipPackage { days: 3, stars_price: 25, points_price: 255 },
                VipPackage { days: 7, stars_price: 40, points_price: 560 },
                VipPackage { days: 14, stars_price: 70, points_price: 980 },
                VipPackage { days: 30, stars_price: 100, points_price: 2100 },
            ],
        }
    }
}

impl VipSettings {
    /// Look up the package for a given length, if offered
    pub fn package_for(&self, days: u32) -> Option<&VipPackage> {
        self.packages.iter().find(|p| p.days == days)
    }

    pub fn validate(&self) -> Result<()> {
        if self.packages.is_empty() {
            return Err(anyhow!("VIP price table cannot be empty"));
        }
        for package in &self.packages {
            if package.days == 0 {
                return Err(anyhow!("VIP package length must be greater than 0 days"));
            }
            if package.stars_price == 0 || package.points_price == 0 {
                return Err(anyhow!(
                    "VIP package prices must be greater than 0 (package: {} days)",
                    package.days
                ));
            }
        }
        Ok(())
    }
}
