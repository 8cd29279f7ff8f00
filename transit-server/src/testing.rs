//! Shared GTFS fixture for tests.

use std::path::Path;

use chrono::NaiveDate;

use crate::dataset::{AgencySource, DatasetImporter, GtfsImporter, ImportRequest};

/// Date on which the `CANCELLED_SVC` service is removed via `calendar_dates`.
pub const FIXTURE_CANCELLED_ON: NaiveDate = match NaiveDate::from_ymd_opt(2024, 6, 10) {
    Some(date) => date,
    None => panic!("invalid fixture date"),
};

const AGENCY: &str = "\u{feff}agency_id,agency_name,agency_url,agency_timezone
A1,Dublin Bus,https://example.ie,Europe/Dublin
";

const ROUTES: &str = "route_id,agency_id,route_short_name,route_long_name,route_type
R46,A1,46A,Phoenix Park - Dun Laoghaire,3
R99,,99,Night Route,3
";

const STOPS: &str = "stop_id,stop_code,stop_name,stop_lat,stop_lon
S1,101,Stop One,53.35,-6.26
S2,102,Stop Two,53.36,-6.27
S3,,Stop Three,,
";

const TRIPS: &str = "route_id,service_id,trip_id,trip_headsign,direction_id
R46,EVERYDAY,T1,Phoenix Park,0
R46,EVERYDAY,T2,Dun Laoghaire,1
R46,CANCELLED_SVC,T3,Phoenix Park,0
R46,NEVER,T4,Phoenix Park,0
R99,EVERYDAY,T5,Night Depot,0
";

// T5 leaves at 47:00 on every service day, so it is always still to come
const STOP_TIMES: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence
T1,08:00:00,08:00:00,S1,1
T1,08:10:00,08:10:00,S2,2
T1,08:20:00,08:20:00,S3,3
T2,09:00:00,09:00:00,S3,1
T2,09:10:00,09:10:00,S2,2
T2,09:20:00,09:20:00,S1,3
T3,7:30:00,7:30:00,S1,1
T3,7:40:00,,S2,2
T4,06:00:00,06:00:00,S1,1
T5,47:00:00,47:00:00,S2,1
";

const CALENDAR: &str =
    "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
EVERYDAY,1,1,1,1,1,1,1,20240101,20301231
CANCELLED_SVC,1,1,1,1,1,1,1,20240101,20301231
NEVER,0,0,0,0,0,0,0,20240101,20301231
";

const CALENDAR_DATES: &str = "service_id,date,exception_type
CANCELLED_SVC,20240610,2
";

/// Write the fixture GTFS feed as a directory of `.txt` files.
pub fn write_gtfs_fixture(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, body) in [
        ("agency.txt", AGENCY),
        ("routes.txt", ROUTES),
        ("stops.txt", STOPS),
        ("trips.txt", TRIPS),
        ("stop_times.txt", STOP_TIMES),
        ("calendar.txt", CALENDAR),
        ("calendar_dates.txt", CALENDAR_DATES),
    ] {
        std::fs::write(dir.join(name), body).unwrap();
    }
}

/// Import the fixture feed into a SQLite dataset at `db`.
pub async fn build_dataset(dir: &Path, db: &Path) {
    let gtfs = dir.join("gtfs-fixture");
    write_gtfs_fixture(&gtfs);

    let request = ImportRequest {
        sources: vec![AgencySource::new(gtfs)],
        destination: db.to_path_buf(),
        verbose: false,
    };
    GtfsImporter::new().import(&request).await.unwrap();
}
