//! Derived weather quantities computed from raw sensor readings.

/// Absolute humidity in g/m^3 from temperature (°C) and relative humidity (%).
///
/// Uses Tetens' approximation of the saturation vapour pressure.
pub fn absolute_humidity(temperature: f64, relative_humidity: f64) -> f64 {
    let saturation_pressure = 6.1078 * 10f64.powf(7.5 * temperature / (temperature + 237.7));
    let saturation_amount = 217.0 * saturation_pressure / (temperature + 273.15);

    saturation_amount * relative_humidity / 100.0
}

/// Temperature-humidity (discomfort) index.
pub fn discomfort_index(temperature: f64, relative_humidity: f64) -> f64 {
    0.81 * temperature + 0.01 * relative_humidity * (0.99 * temperature - 14.3) + 46.3
}

/// Reduce station pressure (hPa) to mean sea level.
///
/// `height` is the station height above sea level in metres. Stations at or
/// below sea level report the pressure unchanged.
pub fn sea_level_pressure(pressure: f64, temperature: f64, height: f64) -> f64 {
    if height <= 0.0 {
        return pressure;
    }

    let kelvin = temperature + 273.15;
    pressure * (kelvin / (kelvin + 0.0065 * height)).powf(-5.257)
}
