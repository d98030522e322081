// Helpers shared by the ward readers.

use std::path::Path;

use crate::pkw::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Builds a ward from the text of its cells. Both coordinates must be present,
/// or both must be blank.
pub fn make_ward(
    community_code: &str,
    no: &str,
    latitude: Option<&str>,
    longitude: Option<&str>,
    lineno: usize,
) -> PkwResult<Ward> {
    let community_code = community_code.trim();
    ensure!(
        !community_code.is_empty(),
        WardWrongValueSnafu {
            lineno,
            content: "empty community code".to_string()
        }
    );
    let no = no.trim().parse::<u32>().ok().context(WardWrongValueSnafu {
        lineno,
        content: no.to_string(),
    })?;
    let latitude = latitude.map(|s| s.trim()).filter(|s| !s.is_empty());
    let longitude = longitude.map(|s| s.trim()).filter(|s| !s.is_empty());
    let location = match (latitude, longitude) {
        (None, None) => None,
        (Some(lat), Some(lon)) => Some(make_location(lat, lon, lineno)?),
        (lat, lon) => {
            return WardWrongValueSnafu {
                lineno,
                content: format!("incomplete location {:?} {:?}", lat, lon),
            }
            .fail()
        }
    };
    Ok(Ward {
        community_code: community_code.to_string(),
        no,
        location,
    })
}

fn make_location(latitude: &str, longitude: &str, lineno: usize) -> PkwResult<GeoPoint> {
    let parse = |s: &str| {
        s.parse::<f64>().ok().context(WardWrongValueSnafu {
            lineno,
            content: s.to_string(),
        })
    };
    GeoPoint::new(parse(latitude)?, parse(longitude)?).context(CountingSnafu {})
}
