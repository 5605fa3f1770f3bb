use crate::error::{AirqError, Result};
use airq_types::AlertRecord;
use std::collections::BTreeMap;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// 经纬度矩形范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self> {
        if min_lat >= max_lat || min_lon >= max_lon {
            return Err(AirqError::InvalidInput(
                "min coordinates must be less than max coordinates".to_string(),
            ));
        }
        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }

    /// 以 (lat, lon) 为中心、半径 `radius_km` 的外接矩形
    pub fn around(lat: f64, lon: f64, radius_km: f64) -> Self {
        let lat_delta = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let cos_lat = lat.to_radians().cos().abs();
        let lon_delta = if cos_lat < 1e-9 {
            180.0
        } else {
            (lat_delta / cos_lat).min(180.0)
        };

        Self {
            min_lat: (lat - lat_delta).max(-90.0),
            min_lon: (lon - lon_delta).max(-180.0),
            max_lat: (lat + lat_delta).min(90.0),
            max_lon: (lon + lon_delta).min(180.0),
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// 两点间大圆距离（km）
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// 网格单元键，坐标保留两位小数
pub fn grid_key(lat: f64, lon: f64) -> String {
    format!("{:.2}_{:.2}", lat, lon)
}

/// 按网格统计告警数量
pub fn density(alerts: &[AlertRecord]) -> BTreeMap<String, usize> {
    let mut cells = BTreeMap::new();
    for alert in alerts {
        *cells.entry(grid_key(alert.latitude, alert.longitude)).or_insert(0) += 1;
    }
    cells
}
