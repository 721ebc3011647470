//! `.prj` well-known-text projection check.
//!
//! Only the first `GEOGCS` token matters here: inputs are expected to be
//! WGS-84 geographic degrees, so anything else is reported but never
//! converted.

/// Extracts the name of the first `GEOGCS` entry, e.g.
/// `GEOGCS["GCS_WGS_1984",DATUM[...]]` yields `GCS_WGS_1984`.
pub(crate) fn geogcs_name(wkt: &str) -> Option<String> {
    let start = wkt.find("GEOGCS")?;
    let rest = &wkt[start..];
    let open = rest.find('"')?;
    let rest = &rest[open + 1..];
    let close = rest.find('"')?;
    Some(rest[..close].to_string())
}

/// Whether the geographic coordinate system names WGS-84.
pub(crate) fn is_wgs84(name: &str) -> bool {
    matches!(name, "GCS_WGS_1984" | "WGS_1984" | "WGS 84" | "WGS84")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_PRJ: &str = concat!(
        "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",",
        "SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],",
        "PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]"
    );

    #[test]
    fn extracts_geogcs_name() {
        assert_eq!(geogcs_name(WGS84_PRJ).as_deref(), Some("GCS_WGS_1984"));
        assert!(is_wgs84("GCS_WGS_1984"));
    }

    #[test]
    fn projected_wkt_reports_inner_geogcs() {
        let wkt = "PROJCS[\"NAD_1983_UTM_Zone_10N\",GEOGCS[\"GCS_North_American_1983\",DATUM[\"D_North_American_1983\"]]]";
        assert_eq!(
            geogcs_name(wkt).as_deref(),
            Some("GCS_North_American_1983")
        );
        assert!(!is_wgs84("GCS_North_American_1983"));
    }

    #[test]
    fn missing_geogcs_yields_none() {
        assert_eq!(geogcs_name("LOCAL_CS[\"bare\"]"), None);
    }
}
