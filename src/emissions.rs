//! Energy and CO2 estimates from transferred bytes.

use serde::Serialize;

pub const KWG_PER_GB: f64 = 1.805;
pub const RETURNING_VISITOR_PERCENTAGE: f64 = 0.75;
pub const FIRST_TIME_VIEWING_PERCENTAGE: f64 = 0.25;
pub const PERCENTAGE_OF_DATA_LOADED_ON_SUBSEQUENT_LOAD: f64 = 0.02;
pub const CARBON_PER_KWG_GRID: f64 = 475.0;
pub const CARBON_PER_KWG_RENEWABLE: f64 = 33.4;
pub const PERCENTAGE_OF_ENERGY_IN_DATACENTER: f64 = 0.1008;
pub const PERCENTAGE_OF_ENERGY_IN_TRANSMISSION_AND_END_USER: f64 = 0.8992;
pub const CO2_GRAMS_TO_LITRES: f64 = 0.5562;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionStatistics {
    /// kWh per page view
    pub energy: f64,
    /// grams of CO2 per page view
    pub co2_per_pageview: f64,
}

pub fn compute_statistics(bytes: u64, green: bool) -> EmissionStatistics {
    let energy = energy_consumption(adjust_data_transfer(bytes));
    let co2_per_pageview = if green {
        co2_renewable(energy)
    } else {
        co2_grid(energy)
    };

    EmissionStatistics {
        energy,
        co2_per_pageview,
    }
}

/// Weight the transfer by returning visitors who load only a fraction of it
/// again. Truncates to whole bytes.
pub fn adjust_data_transfer(bytes: u64) -> u64 {
    let bytes = bytes as f64;
    (bytes * RETURNING_VISITOR_PERCENTAGE
        + PERCENTAGE_OF_DATA_LOADED_ON_SUBSEQUENT_LOAD * bytes * FIRST_TIME_VIEWING_PERCENTAGE)
        as u64
}

/// Bytes to kWh.
pub fn energy_consumption(bytes: u64) -> f64 {
    bytes as f64 * (KWG_PER_GB / BYTES_PER_GB)
}

pub fn co2_grid(energy: f64) -> f64 {
    energy * CARBON_PER_KWG_GRID
}

pub fn co2_renewable(energy: f64) -> f64 {
    energy * PERCENTAGE_OF_ENERGY_IN_DATACENTER * CARBON_PER_KWG_RENEWABLE
        + energy * PERCENTAGE_OF_ENERGY_IN_TRANSMISSION_AND_END_USER * CARBON_PER_KWG_GRID
}

pub fn co2_to_litres(co2: f64) -> f64 {
    co2 * CO2_GRAMS_TO_LITRES
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_adjust_data_transfer_truncates() {
        assert_eq!(adjust_data_transfer(0), 0);
        assert_eq!(adjust_data_transfer(1000), 755);
        // 7 * 0.755 = 5.285
        assert_eq!(adjust_data_transfer(7), 5);
    }

    #[test]
    fn test_energy_of_one_gigabyte() {
        assert!(approx_eq(energy_consumption(1_073_741_824), KWG_PER_GB));
    }

    #[test]
    fn test_renewable_is_lower_than_grid() {
        let energy = energy_consumption(2_000_000);
        assert!(co2_renewable(energy) < co2_grid(energy));
        assert!(approx_eq(co2_grid(1.0), 475.0));
        assert!(approx_eq(co2_renewable(1.0), 0.1008 * 33.4 + 0.8992 * 475.0));
    }

    #[test]
    fn test_compute_statistics() {
        let bytes = 1_000_000;
        let energy = energy_consumption(adjust_data_transfer(bytes));

        let grid = compute_statistics(bytes, false);
        assert!(approx_eq(grid.energy, energy));
        assert!(approx_eq(grid.co2_per_pageview, co2_grid(energy)));

        let green = compute_statistics(bytes, true);
        assert!(approx_eq(green.co2_per_pageview, co2_renewable(energy)));
    }

    #[test]
    fn test_co2_to_litres() {
        assert!(approx_eq(co2_to_litres(2.0), 1.1124));
    }
}
