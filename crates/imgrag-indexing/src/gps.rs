//! EXIF GPS 提取
//!
//! 读取失败、缺少字段或数据异常都只返回 `None`，上层流程不会因此中断。

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{Exif, In, Rational, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 十进制度数表示的坐标，序列化为 `[lat, lon]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<(f64, f64)> for GpsCoordinates {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self { latitude, longitude }
    }
}

impl From<GpsCoordinates> for (f64, f64) {
    fn from(coords: GpsCoordinates) -> Self {
        (coords.latitude, coords.longitude)
    }
}

pub fn read_gps(path: &Path) -> Option<GpsCoordinates> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("cannot open {} for GPS: {}", path.display(), e);
            return None;
        }
    };

    match Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => gps_from_exif(&exif),
        Err(e) => {
            debug!("no EXIF in {}: {}", path.display(), e);
            None
        }
    }
}

pub fn gps_from_exif(exif: &Exif) -> Option<GpsCoordinates> {
    let latitude = rationals(exif, Tag::GPSLatitude).and_then(dms_to_degrees)?;
    let longitude = rationals(exif, Tag::GPSLongitude).and_then(dms_to_degrees)?;
    let lat_ref = hemisphere(exif, Tag::GPSLatitudeRef)?;
    let lon_ref = hemisphere(exif, Tag::GPSLongitudeRef)?;

    Some(GpsCoordinates {
        latitude: if lat_ref == b'S' { -latitude } else { latitude },
        longitude: if lon_ref == b'W' { -longitude } else { longitude },
    })
}

/// 度/分/秒有理数转十进制度数，分母为 0 时直接取分子
pub fn dms_to_degrees(values: &[Rational]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let part = |r: &Rational| {
        if r.denom == 0 {
            r.num as f64
        } else {
            r.num as f64 / r.denom as f64
        }
    };
    Some(part(&values[0]) + part(&values[1]) / 60.0 + part(&values[2]) / 3600.0)
}

fn rationals(exif: &Exif, tag: Tag) -> Option<&[Rational]> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => Some(values.as_slice()),
        _ => None,
    }
}

fn hemisphere(exif: &Exif, tag: Tag) -> Option<u8> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(values) => values.first()?.first().map(u8::to_ascii_uppercase),
        _ => None,
    }
}
