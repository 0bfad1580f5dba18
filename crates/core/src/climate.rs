//! Derived climate quantities.

/// Dew point in °C for relative humidity `humidity` (%) at air temperature
/// `temperature` (°C), Sonntag's Magnus coefficients over water above 0 °C
/// and over ice below.
///
/// `None` when the humidity is not positive or the inputs are not finite.
pub fn dew_point(humidity: f64, temperature: f64) -> Option<f64> {
    if !(humidity > 0.0) || !temperature.is_finite() {
        return None;
    }
    const C1: f64 = 6.107_80;
    let (c2, c3) = if temperature > 0.0 {
        (17.080_85, 234.175)
    } else {
        (17.843_62, 245.425)
    };

    // Saturation and actual vapour pressure, hPa.
    let saturation = C1 * (c2 * temperature / (c3 + temperature)).exp();
    let vapour = saturation * humidity.min(100.0) / 100.0;
    let ln = (vapour / C1).ln();
    Some(-ln * c3 / (ln - c2))
}
