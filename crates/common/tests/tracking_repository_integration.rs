#![cfg(feature = "integration-tests")]

use chrono::{NaiveDate, TimeZone, Utc};
use common::domain::{
    AddressFields, Coordinate, FindVehicleByDeviceRepoInput, GetLatestPositionRepoInput,
    GetLatestTripSummaryRepoInput, GetVehicleForUserRepoInput, ListPositionsByUserRepoInput,
    ListPositionsByVehicleRepoInput, ListStopsRepoInput, ListTripSummariesRepoInput,
    PositionRepository, PositionSample, StopEvent, StopRepository, StopSummary,
    SummaryDateFilter, TripSummary, TripSummaryRepository, VehicleRepository,
};
use common::postgres::{
    PostgresClient, PostgresPositionRepository, PostgresStopRepository,
    PostgresTripSummaryRepository, PostgresVehicleRepository,
};
use goose::MigrationRunner;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

const USER_ID: &str = "user-001";
const VEHICLE_ID: &str = "truck-01";
const DEVICE_ID: &str = "imei-356938035643809";

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresClient) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let migrations_dir = format!("{}/migrations/postgres", env!("CARGO_MANIFEST_DIR"));
    let dsn = format!(
        "postgres://postgres:postgres@{}:{}/postgres?sslmode=disable",
        host, port
    );
    let goose_path = which::which("goose").expect("goose binary not found");

    MigrationRunner::postgres(&goose_path.to_string_lossy(), &migrations_dir, &dsn)
        .run_migrations()
        .await
        .expect("Migrations failed");

    let client = PostgresClient::new(
        &host.to_string(),
        port,
        "postgres",
        "postgres",
        "postgres",
        5,
    )
    .expect("Failed to create client");

    let conn = client.get_connection().await.unwrap();
    conn.execute(
        "INSERT INTO vehicles (vehicle_id, device_id, user_id, plate_number, model)
         VALUES ($1, $2, $3, 'KZ-1234', 'Hilux')",
        &[&VEHICLE_ID, &DEVICE_ID, &USER_ID],
    )
    .await
    .unwrap();

    (postgres, client)
}

fn sample(seconds: i64, latitude: f64, speed: f64) -> PositionSample {
    PositionSample {
        vehicle_id: VEHICLE_ID.to_string(),
        user_id: USER_ID.to_string(),
        coordinate: Coordinate::new(latitude, 25.47).unwrap(),
        speed,
        recorded_at: Utc.timestamp_opt(1_717_236_000 + seconds, 0).unwrap(),
        address: AddressFields {
            street: "Avenue Lumumba".to_string(),
            city: "Kolwezi".to_string(),
            country: "RDC".to_string(),
            ..AddressFields::default()
        },
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_vehicle_lookup_by_device() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresVehicleRepository::new(client);

    let owner = repo
        .find_by_device(FindVehicleByDeviceRepoInput {
            device_id: DEVICE_ID.to_string(),
        })
        .await
        .unwrap()
        .expect("vehicle should be registered");
    assert_eq!(owner.vehicle_id, VEHICLE_ID);
    assert_eq!(owner.user_id, USER_ID);

    let unknown = repo
        .find_by_device(FindVehicleByDeviceRepoInput {
            device_id: "unknown".to_string(),
        })
        .await
        .unwrap();
    assert!(unknown.is_none());

    let other_user = repo
        .get_vehicle_for_user(GetVehicleForUserRepoInput {
            vehicle_id: VEHICLE_ID.to_string(),
            user_id: "someone-else".to_string(),
        })
        .await
        .unwrap();
    assert!(other_user.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_positions_are_ordered_and_scoped() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresPositionRepository::new(client);

    repo.insert_position(&sample(0, -10.70, 30.0)).await.unwrap();
    repo.insert_position(&sample(20, -10.71, 0.0)).await.unwrap();
    repo.insert_position(&sample(10, -10.705, 12.0)).await.unwrap();

    let latest = repo
        .get_latest_position(GetLatestPositionRepoInput {
            vehicle_id: VEHICLE_ID.to_string(),
            user_id: USER_ID.to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.coordinate.latitude, -10.71);
    assert_eq!(latest.address.city, "Kolwezi");

    let history = repo
        .list_positions_by_vehicle(ListPositionsByVehicleRepoInput {
            vehicle_id: VEHICLE_ID.to_string(),
            user_id: USER_ID.to_string(),
        })
        .await
        .unwrap();
    let speeds: Vec<f64> = history.iter().map(|p| p.speed).collect();
    assert_eq!(speeds, vec![30.0, 12.0, 0.0]);

    let foreign = repo
        .list_positions_by_user(ListPositionsByUserRepoInput {
            user_id: "someone-else".to_string(),
        })
        .await
        .unwrap();
    assert!(foreign.is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_stops_filtered_by_day() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresStopRepository::new(client);

    let stop = StopEvent {
        vehicle_id: VEHICLE_ID.to_string(),
        user_id: USER_ID.to_string(),
        coordinate: Coordinate::new(-10.71, 25.47).unwrap(),
        started_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        duration_seconds: 120,
        neighborhood: "Mutoshi".to_string(),
        street: "Avenue Lumumba".to_string(),
    };
    repo.insert_stop(&stop).await.unwrap();

    let on_day = repo
        .list_stops_by_vehicle(ListStopsRepoInput {
            vehicle_id: VEHICLE_ID.to_string(),
            user_id: USER_ID.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1),
        })
        .await
        .unwrap();
    assert_eq!(on_day, vec![stop]);

    let other_day = repo
        .list_stops_by_vehicle(ListStopsRepoInput {
            vehicle_id: VEHICLE_ID.to_string(),
            user_id: USER_ID.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 2),
        })
        .await
        .unwrap();
    assert!(other_day.is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_trip_summaries_roundtrip_with_stops() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresTripSummaryRepository::new(client);

    let day1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
    let summary = |date: NaiveDate, end_time: &str| TripSummary {
        vehicle_id: VEHICLE_ID.to_string(),
        user_id: USER_ID.to_string(),
        date,
        distance_km: 12.35,
        start_time: "08:00".to_string(),
        end_time: end_time.to_string(),
        total_stops: 1,
        total_stop_time: "2 min".to_string(),
        stops: vec![StopSummary {
            latitude: -10.71,
            longitude: 25.47,
            duration_seconds: 120,
            neighborhood: "Mutoshi".to_string(),
            street: "Avenue Lumumba".to_string(),
        }],
    };

    repo.insert_summary(&summary(day1, "09:00")).await.unwrap();
    repo.insert_summary(&summary(day1, "17:30")).await.unwrap();
    repo.insert_summary(&summary(day2, "10:00")).await.unwrap();

    let all = repo
        .list_summaries(ListTripSummariesRepoInput {
            user_id: USER_ID.to_string(),
            vehicle_id: None,
            date_filter: SummaryDateFilter::Any,
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].date, day2);
    assert_eq!(all[0].stops.len(), 1);

    let on_day1 = repo
        .list_summaries(ListTripSummariesRepoInput {
            user_id: USER_ID.to_string(),
            vehicle_id: Some(VEHICLE_ID.to_string()),
            date_filter: SummaryDateFilter::On(day1),
        })
        .await
        .unwrap();
    assert_eq!(on_day1.len(), 2);

    let latest = repo
        .get_latest_summary(GetLatestTripSummaryRepoInput {
            user_id: USER_ID.to_string(),
            vehicle_id: None,
            date: day1,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.end_time, "17:30");
    assert_eq!(latest, summary(day1, "17:30"));
}
