/// Request validation and translation into normalized parameters
use crate::domain::{
    BoundingBox, ColourMap, ElevationRange, PlotRequest, Projection, RunCadence, RunDirection,
    RunParams, RunRequest, Summarise, TimeUnit,
};
use crate::errors::{ApiError, ApiResult};
use crate::utils::BUCKET_LABEL_FORMAT;
use chrono::{DateTime, Duration, NaiveTime, Utc};

pub const MAX_RUN_DAYS: i64 = 20;
pub const MAX_SPAN_DAYS: i64 = 93;
pub const MAX_ELEVATION_RANGES: usize = 4;
pub const RESOLUTIONS: [f64; 2] = [0.05, 0.25];
pub const RELEASE_LENGTHS: [u32; 5] = [1, 3, 6, 12, 24];

/// The model misbehaves at the antimeridian when handed the full longitude span
pub const NARROWED_MIN_LON: f64 = -179.875;
pub const NARROWED_MAX_LON: f64 = 179.9;

/// Plot request fields that passed validation; run-directory checks happen later
#[derive(Debug, Clone)]
pub struct PlotSelection {
    pub run_id: String,
    pub summarise: Summarise,
    pub timestamp: Option<String>,
    pub station: bool,
    pub projection: Option<Projection>,
    pub bbox: BoundingBox,
    pub scale: Option<(f64, f64)>,
    pub colormap: ColourMap,
}

pub fn check_bounding_box(
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
) -> ApiResult<BoundingBox> {
    if min_lon < -180.0 {
        return invalid("Bounding box minimum longitude input cannot be below -180");
    }
    if max_lon > 180.0 {
        return invalid("Bounding box maximum longitude input cannot be above 180");
    }
    if min_lat < -90.0 {
        return invalid("Bounding box minimum latitude input cannot be below -90");
    }
    if max_lat > 90.0 {
        return invalid("Bounding box maximum latitude input cannot be above 90");
    }
    if min_lon >= max_lon {
        return invalid(format!(
            "Bounding box minimum longitude ({min_lon}) must be less than maximum longitude ({max_lon})"
        ));
    }
    if min_lat >= max_lat {
        return invalid(format!(
            "Bounding box minimum latitude ({min_lat}) must be less than maximum latitude ({max_lat})"
        ));
    }
    Ok(BoundingBox {
        min_lon,
        max_lon,
        min_lat,
        max_lat,
    })
}

pub fn narrow_full_longitude(bbox: BoundingBox) -> BoundingBox {
    if bbox.min_lon == -180.0 && bbox.max_lon == 180.0 {
        BoundingBox {
            min_lon: NARROWED_MIN_LON,
            max_lon: NARROWED_MAX_LON,
            ..bbox
        }
    } else {
        bbox
    }
}

/// Translate an `"a-b"` elevation string into a range
pub fn translate_elevation(elevation_range: &str) -> ApiResult<ElevationRange> {
    let Some((mini, maxi)) = elevation_range.split_once('-') else {
        return invalid(format!(
            "The value \"{elevation_range}\" does not contain a \"-\" character to define a range, e.g. 0-100"
        ));
    };
    let (mini, maxi) = match (mini.trim().parse::<i64>(), maxi.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => (a, b),
        _ => {
            return invalid(format!(
                "The value {elevation_range} is incorrect: cannot find two numbers"
            ))
        }
    };
    if mini >= maxi {
        return invalid(format!(
            "The value {elevation_range} is incorrect: minimum is not less than maximum"
        ));
    }
    if mini < 0 || maxi < 0 {
        return invalid(format!(
            "The value {elevation_range} is incorrect: Entire range must be above 0"
        ));
    }
    let to_u32 = |v: i64| {
        u32::try_from(v).map_err(|_| {
            ApiError::InvalidInput(format!(
                "The value {elevation_range} is incorrect: {v} is too large"
            ))
        })
    };
    Ok(ElevationRange {
        min: to_u32(mini)?,
        max: to_u32(maxi)?,
    })
}

/// Start must not follow end, and the inclusive span must stay under three months
pub fn check_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> ApiResult<()> {
    if start > end {
        return invalid("The end date is earlier than the start date!");
    }
    if (end + Duration::days(1)) - start >= Duration::days(MAX_SPAN_DAYS) {
        return invalid("Can only run across a maximum of three months in one go");
    }
    Ok(())
}

pub fn check_duration(time: i64, unit: TimeUnit) -> ApiResult<u32> {
    if time < 1 {
        return invalid(format!("Run time must be at least 1 {unit}, got {time}"));
    }
    let limit = match unit {
        TimeUnit::Days => MAX_RUN_DAYS,
        TimeUnit::Hours => MAX_RUN_DAYS * 24,
    };
    if time > limit {
        return invalid("Can only run NAME over a maximum of 20 days forwards/backwards");
    }
    Ok(time as u32)
}

fn check_release_location(longitude: f64, latitude: f64) -> ApiResult<()> {
    if !(-180.0..=180.0).contains(&longitude) {
        return invalid(format!(
            "Release longitude {longitude} must be within -180 to 180"
        ));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return invalid(format!(
            "Release latitude {latitude} must be within -90 to 90"
        ));
    }
    Ok(())
}

fn check_resolution(resolution: f64) -> ApiResult<f64> {
    RESOLUTIONS
        .iter()
        .copied()
        .find(|allowed| (allowed - resolution).abs() < 1e-9)
        .ok_or_else(|| {
            ApiError::InvalidInput(format!(
                "resolution {resolution} is not one of: 0.05, 0.25"
            ))
        })
}

fn parse_daily_time(raw: &str) -> ApiResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M"))
        .map_err(|_| {
            ApiError::InvalidInput(format!("daily_time \"{raw}\" is not a time of day (HH:MM)"))
        })
}

pub fn validate_run_request(req: &RunRequest) -> ApiResult<RunParams> {
    if req.title.trim().is_empty() {
        return invalid("title must not be empty");
    }
    check_release_location(req.longitude, req.latitude)?;

    if req.elevation_out.is_empty() || req.elevation_out.len() > MAX_ELEVATION_RANGES {
        return invalid(format!(
            "elevation_out must hold between 1 and {MAX_ELEVATION_RANGES} ranges, got {}",
            req.elevation_out.len()
        ));
    }
    let elevation_ranges = req
        .elevation_out
        .iter()
        .map(|range| translate_elevation(range))
        .collect::<ApiResult<Vec<_>>>()?;

    let domain = narrow_full_longitude(check_bounding_box(
        req.min_lon,
        req.max_lon,
        req.min_lat,
        req.max_lat,
    )?);

    check_dates(req.start_date, req.end_date)?;

    let time_unit: TimeUnit = req.time_unit.parse()?;
    let duration = check_duration(req.time, time_unit)?;

    let resolution = check_resolution(req.resolution)?;
    let cadence: RunCadence = req.run_type.parse()?;
    let daily_time = req.daily_time.as_deref().map(parse_daily_time).transpose()?;

    if let Some(len) = req.daily_release_len {
        if !RELEASE_LENGTHS.contains(&len) {
            return invalid(format!(
                "daily_release_len {len} is not one of: 1, 3, 6, 12, 24"
            ));
        }
    }

    Ok(RunParams {
        title: req.title.trim().to_string(),
        longitude: req.longitude,
        latitude: req.latitude,
        elevation: req.elevation,
        direction: RunDirection::from_backwards(req.run_backwards),
        duration,
        time_unit,
        domain,
        elevation_ranges,
        resolution,
        cadence,
        daily_time,
        daily_release_len: req.daily_release_len,
        start_date: req.start_date,
        end_date: req.end_date,
    })
}

/// Parse a `"min,max"` colour scale
pub fn parse_scale(raw: &str) -> ApiResult<(f64, f64)> {
    let parsed = raw
        .split_once(',')
        .and_then(|(a, b)| Some((a.trim().parse::<f64>().ok()?, b.trim().parse::<f64>().ok()?)));
    match parsed {
        Some((min, max)) if min < max => Ok((min, max)),
        Some(_) => invalid(format!(
            "scale \"{raw}\" is incorrect: minimum is not less than maximum"
        )),
        None => invalid(format!("scale \"{raw}\" must be two numbers as Min,Max")),
    }
}

pub fn check_run_id(run_id: &str) -> ApiResult<()> {
    let trimmed = run_id.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return invalid(format!("run_id \"{run_id}\" is not a valid run identifier"));
    }
    Ok(())
}

pub fn validate_plot_request(req: &PlotRequest) -> ApiResult<PlotSelection> {
    check_run_id(&req.run_id)?;
    let bbox = check_bounding_box(req.min_lon, req.max_lon, req.min_lat, req.max_lat)?;

    // a specific timestamp excludes summary plots
    let summarise = match req.timestamp {
        Some(_) => Summarise::None,
        None => req.summarise.parse()?,
    };

    Ok(PlotSelection {
        run_id: req.run_id.trim().to_string(),
        summarise,
        timestamp: req
            .timestamp
            .map(|ts| ts.format(BUCKET_LABEL_FORMAT).to_string()),
        station: req.station.unwrap_or(false),
        projection: req.projection.as_deref().map(str::parse).transpose()?,
        bbox,
        scale: req.scale.as_deref().map(parse_scale).transpose()?,
        colormap: req.colormap.parse()?,
    })
}

fn invalid<T>(message: impl Into<String>) -> ApiResult<T> {
    Err(ApiError::InvalidInput(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn run_request() -> RunRequest {
        serde_json::from_value(serde_json::json!({
            "title": "mace head",
            "longitude": -9.9,
            "latitude": 53.3,
            "run_type": "daily",
            "start_date": "2023-01-01T00:00:00Z",
            "end_date": "2023-01-10T00:00:00Z"
        }))
        .unwrap()
    }

    fn plot_request() -> PlotRequest {
        serde_json::from_value(serde_json::json!({ "run_id": "mace_head_20230101" })).unwrap()
    }

    #[test]
    fn test_bounding_box_within_range_passes() {
        let bbox = check_bounding_box(-10.0, 5.0, 40.0, 60.0).unwrap();
        assert_eq!(bbox.min_lon, -10.0);
        assert_eq!(bbox.max_lat, 60.0);
        assert!(check_bounding_box(-180.0, 180.0, -90.0, 90.0).is_ok());
    }

    #[test]
    fn test_bounding_box_out_of_range_fails() {
        for (a, b, c, d) in [
            (-180.5, 0.0, 0.0, 10.0),
            (0.0, 180.5, 0.0, 10.0),
            (0.0, 10.0, -90.5, 10.0),
            (0.0, 10.0, 0.0, 90.5),
        ] {
            let err = check_bounding_box(a, b, c, d).unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT");
        }
    }

    #[test]
    fn test_bounding_box_degenerate_fails() {
        assert!(check_bounding_box(10.0, 10.0, 0.0, 10.0).is_err());
        assert!(check_bounding_box(20.0, 10.0, 0.0, 10.0).is_err());
        assert!(check_bounding_box(0.0, 10.0, 5.0, 5.0).is_err());
    }

    #[test]
    fn test_full_longitude_is_narrowed() {
        let bbox = check_bounding_box(-180.0, 180.0, -90.0, 90.0).unwrap();
        let narrowed = narrow_full_longitude(bbox);
        assert_eq!(narrowed.min_lon, -179.875);
        assert_eq!(narrowed.max_lon, 179.9);
        assert_eq!(narrowed.min_lat, -90.0);

        let partial = check_bounding_box(-180.0, 170.0, -90.0, 90.0).unwrap();
        assert_eq!(narrow_full_longitude(partial), partial);
    }

    #[test]
    fn test_translate_elevation_valid() {
        assert_eq!(
            translate_elevation("0-100").unwrap(),
            ElevationRange { min: 0, max: 100 }
        );
        assert_eq!(
            translate_elevation("100-2000").unwrap(),
            ElevationRange { min: 100, max: 2000 }
        );
    }

    #[test]
    fn test_translate_elevation_missing_separator() {
        let err = translate_elevation("100").unwrap_err();
        assert!(err.to_string().contains("does not contain a \"-\""));
    }

    #[test]
    fn test_translate_elevation_non_numeric() {
        assert!(translate_elevation("a-100").is_err());
        assert!(translate_elevation("0-").is_err());
        assert!(translate_elevation("-5-10").is_err());
    }

    #[test]
    fn test_translate_elevation_ordering() {
        assert!(translate_elevation("100-100").is_err());
        assert!(translate_elevation("200-100").is_err());
        assert!(translate_elevation("5--10").is_err());
    }

    #[test]
    fn test_dates_ordering() {
        assert!(check_dates(utc(2023, 1, 1), utc(2023, 1, 1)).is_ok());
        assert!(check_dates(utc(2023, 1, 2), utc(2023, 1, 1)).is_err());
    }

    #[test]
    fn test_dates_span_boundary() {
        // Jan 1 to Apr 2 inclusive is 92 days, Apr 3 makes 93
        assert!(check_dates(utc(2023, 1, 1), utc(2023, 4, 2)).is_ok());
        let err = check_dates(utc(2023, 1, 1), utc(2023, 4, 3)).unwrap_err();
        assert!(err.to_string().contains("three months"));
    }

    #[test]
    fn test_duration_limits() {
        assert_eq!(check_duration(20, TimeUnit::Days).unwrap(), 20);
        assert!(check_duration(21, TimeUnit::Days).is_err());
        assert_eq!(check_duration(480, TimeUnit::Hours).unwrap(), 480);
        assert!(check_duration(481, TimeUnit::Hours).is_err());
        assert!(check_duration(0, TimeUnit::Hours).is_err());
    }

    #[test]
    fn test_validate_run_request_defaults() {
        let params = validate_run_request(&run_request()).unwrap();
        assert_eq!(params.elevation, 10);
        assert_eq!(params.direction, RunDirection::Backward);
        assert_eq!(params.duration, 1);
        assert_eq!(params.time_unit, TimeUnit::Days);
        assert_eq!(params.elevation_ranges, vec![ElevationRange { min: 0, max: 100 }]);
        assert_eq!(params.resolution, 0.25);
        assert_eq!(params.cadence, RunCadence::Daily);
        assert_eq!(params.domain.min_lon, NARROWED_MIN_LON);
        assert_eq!(params.domain.max_lon, NARROWED_MAX_LON);
    }

    #[test]
    fn test_validate_run_request_rejects_too_many_ranges() {
        let mut req = run_request();
        req.elevation_out = vec!["0-1".into(), "1-2".into(), "2-3".into(), "3-4".into(), "4-5".into()];
        assert!(validate_run_request(&req).is_err());
        req.elevation_out.truncate(4);
        assert_eq!(validate_run_request(&req).unwrap().elevation_ranges.len(), 4);
    }

    #[test]
    fn test_validate_run_request_allowed_values() {
        let mut req = run_request();
        req.resolution = 0.1;
        assert!(validate_run_request(&req).is_err());

        let mut req = run_request();
        req.daily_release_len = Some(5);
        assert!(validate_run_request(&req).is_err());

        let mut req = run_request();
        req.daily_release_len = Some(6);
        req.daily_time = Some("09:30".into());
        let params = validate_run_request(&req).unwrap();
        assert_eq!(params.daily_time, NaiveTime::from_hms_opt(9, 30, 0));

        let mut req = run_request();
        req.latitude = 91.0;
        assert!(validate_run_request(&req).is_err());
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale("1e-9, 1e-5").unwrap(), (1e-9, 1e-5));
        assert!(parse_scale("5").is_err());
        assert!(parse_scale("5,1").is_err());
        assert!(parse_scale("a,b").is_err());
    }

    #[test]
    fn test_run_id_rejects_paths() {
        assert!(check_run_id("mace_head_20230101").is_ok());
        assert!(check_run_id("../etc").is_err());
        assert!(check_run_id("..").is_err());
        assert!(check_run_id("").is_err());
    }

    #[test]
    fn test_plot_timestamp_forces_no_summary() {
        let mut req = plot_request();
        req.summarise = "week".into();
        req.timestamp = Some(Utc.with_ymd_and_hms(2023, 1, 5, 9, 0, 0).unwrap());
        let selection = validate_plot_request(&req).unwrap();
        assert_eq!(selection.summarise, Summarise::None);
        assert_eq!(selection.timestamp.as_deref(), Some("05/01/2023 09:00 UTC"));
    }

    #[test]
    fn test_plot_defaults() {
        let selection = validate_plot_request(&plot_request()).unwrap();
        assert_eq!(selection.summarise, Summarise::None);
        assert_eq!(selection.colormap, ColourMap::Coolwarm);
        assert!(!selection.station);
        assert!(selection.scale.is_none());
        assert_eq!(selection.bbox.min_lon, -180.0);
    }

    #[test]
    fn test_plot_rejects_unknown_colormap() {
        let mut req = plot_request();
        req.colormap = "jet".into();
        assert!(validate_plot_request(&req).is_err());
    }
}
