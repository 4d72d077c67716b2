/*
 *  providers/transit.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Train arrival board: slot selection, countdown tokens and banners
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::STATUS_TOKEN_CHARS;
use crate::fetch::{ProviderError, with_deadline};
use crate::providers::clock::WallClock;
use crate::providers::{Provider, ProviderCommand};
use crate::render::{Prediction, PredictionStatus, RenderMessage};
use crate::sign::{ControlError, SignMode};

/// Stations on the line, in track order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Station {
    Alewife,
    Davis,
    Porter,
    Harvard,
    Central,
    Kendall,
    CharlesMgh,
    ParkStreet,
    DowntownCrossing,
    SouthStation,
}

impl Station {
    pub const ALL: [Station; 10] = [
        Station::Alewife,
        Station::Davis,
        Station::Porter,
        Station::Harvard,
        Station::Central,
        Station::Kendall,
        Station::CharlesMgh,
        Station::ParkStreet,
        Station::DowntownCrossing,
        Station::SouthStation,
    ];

    /// MBTA stop id.
    pub fn code(self) -> &'static str {
        match self {
            Station::Alewife => "place-alfcl",
            Station::Davis => "place-davis",
            Station::Porter => "place-portr",
            Station::Harvard => "place-harsq",
            Station::Central => "place-cntsq",
            Station::Kendall => "place-knncl",
            Station::CharlesMgh => "place-chmnl",
            Station::ParkStreet => "place-pktrm",
            Station::DowntownCrossing => "place-dwnxg",
            Station::SouthStation => "place-sstat",
        }
    }

    /// Name as printed on the sign.
    pub fn name(self) -> &'static str {
        match self {
            Station::Alewife => "Alewife",
            Station::Davis => "Davis",
            Station::Porter => "Porter",
            Station::Harvard => "Harvard",
            Station::Central => "Central",
            Station::Kendall => "Kendall/MIT",
            Station::CharlesMgh => "Charles/MGH",
            Station::ParkStreet => "Park Street",
            Station::DowntownCrossing => "Downtown Crossing",
            Station::SouthStation => "South Station",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts an index, a stop id, or a name ("park street", "park_street").
impl FromStr for Station {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(idx) = s.parse::<usize>() {
            return Station::ALL
                .get(idx)
                .copied()
                .ok_or_else(|| ControlError::InvalidStation(s.to_string()));
        }
        if let Some(station) = Station::from_code(s) {
            return Ok(station);
        }
        let wanted = normalise(s);
        Station::ALL
            .iter()
            .copied()
            .find(|st| normalise(st.name()) == wanted || normalise(&format!("{:?}", st)) == wanted)
            .ok_or_else(|| ControlError::InvalidStation(s.to_string()))
    }
}

fn normalise(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// MBTA direction_id 0.
    #[default]
    Southbound,
    /// MBTA direction_id 1.
    Northbound,
}

impl Direction {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Direction::Southbound),
            1 => Some(Direction::Northbound),
            _ => None,
        }
    }
}

/// Which predictions fill the two rows of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotLayout {
    /// Next train each way.
    #[default]
    BothDirections,
    /// Next two trains in the configured direction.
    OneDirection,
}

impl SlotLayout {
    /// (direction, nth match) for each row.
    pub fn slots(self, direction: Direction) -> [(Direction, usize); 2] {
        match self {
            SlotLayout::BothDirections => [(Direction::Southbound, 0), (Direction::Northbound, 0)],
            SlotLayout::OneDirection => [(direction, 0), (direction, 1)],
        }
    }
}

/// One upstream prediction, already joined with its trip headsign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPrediction {
    pub direction: Direction,
    pub arrival: Option<DateTime<Utc>>,
    pub departure: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub headsign: Option<String>,
}

/// Where predictions come from.
#[async_trait]
pub trait TransitSource: Send + Sync {
    async fn predictions(&self, station: Station) -> Result<Vec<RawPrediction>, ProviderError>;
}

/// Null-status predictions whose arrival passed longer ago than this are stale.
const DEPARTED_GRACE_SECS: i64 = 30;

/// Countdown token for one prediction.
///
/// `arrival` and `departure` are seconds from now. A missing arrival falls
/// back to the departure time.
pub fn prediction_token(status: Option<&str>, arrival: Option<i64>, departure: Option<i64>) -> String {
    if let Some(status) = status {
        let status = status.to_lowercase();
        if status.contains("stopped") {
            return "STOP".to_string();
        }
        return status.chars().take(STATUS_TOKEN_CHARS).collect();
    }
    // A strict reading needs both timestamps. The first stop of a trip only
    // carries a departure, so that train counts down on its departure instead
    // of showing ERROR until it leaves.
    let Some(arr) = arrival.or(departure) else {
        return "ERROR".to_string();
    };
    if arr > 60 {
        format!("{} min", arr.div_euclid(60))
    } else if arr > 0 {
        "ARR".to_string()
    } else if departure.is_some_and(|dep| dep > 0) {
        "BRD".to_string()
    } else {
        "ERROR".to_string()
    }
}

fn seconds_until(t: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    t.map(|t| (t - now).num_seconds())
}

/// Nth prediction for `direction`, ignoring trains that have clearly left.
fn nth_for_direction<'a>(
    raw: &'a [RawPrediction],
    direction: Direction,
    n: usize,
    now: DateTime<Utc>,
) -> Option<&'a RawPrediction> {
    raw.iter()
        .filter(|p| p.direction == direction)
        .filter(|p| {
            p.status.is_some()
                || seconds_until(p.arrival.or(p.departure), now).is_none_or(|d| d > -DEPARTED_GRACE_SECS)
        })
        .nth(n)
}

/// Fill both rows of the board, or fail if either slot has no train.
pub fn select_predictions(
    raw: &[RawPrediction],
    layout: SlotLayout,
    direction: Direction,
    now: DateTime<Utc>,
) -> Result<[Prediction; 2], ProviderError> {
    let mut out = [Prediction::default(); 2];
    for (slot, (dir, n)) in layout.slots(direction).into_iter().enumerate() {
        let p = nth_for_direction(raw, dir, n, now)
            .ok_or_else(|| ProviderError::NotFound(format!("prediction {} for {:?}", n, dir)))?;
        let headsign = p
            .headsign
            .as_deref()
            .ok_or_else(|| ProviderError::NotFound("trip headsign".to_string()))?;
        let token = prediction_token(
            p.status.as_deref(),
            seconds_until(p.arrival, now),
            seconds_until(p.departure, now),
        );
        out[slot] = Prediction::new(headsign, &token);
    }
    Ok(out)
}

/// First slot that just flipped into "ARR".
pub fn arriving_slot(previous: &[Prediction; 2], current: &[Prediction; 2]) -> Option<usize> {
    (0..current.len()).find(|&i| current[i].value.as_str() == "ARR" && previous[i].value.as_str() != "ARR")
}

pub fn placeholder_predictions() -> [Prediction; 2] {
    [Prediction::new("Ashmont", ""), Prediction::new("Alewife", "")]
}

/// Polls a [`TransitSource`] and tracks what the board last showed.
pub struct TransitProvider {
    source: Arc<dyn TransitSource>,
    clock: Arc<dyn WallClock>,
    station: Station,
    layout: SlotLayout,
    direction: Direction,
    deadline: Duration,
    last_shown: [Prediction; 2],
}

impl TransitProvider {
    pub fn new(
        source: Arc<dyn TransitSource>,
        clock: Arc<dyn WallClock>,
        station: Station,
        layout: SlotLayout,
        direction: Direction,
        deadline: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            station,
            layout,
            direction,
            deadline,
            last_shown: placeholder_predictions(),
        }
    }

    pub fn station(&self) -> Station {
        self.station
    }

    pub fn last_shown(&self) -> &[Prediction; 2] {
        &self.last_shown
    }

    /// Switch station; the board restarts from placeholders.
    pub fn set_station(&mut self, station: Station) -> RenderMessage {
        self.station = station;
        self.last_shown = placeholder_predictions();
        let mut banner = placeholder_predictions();
        banner[0] = Prediction::new(station.name(), "");
        RenderMessage::transit(PredictionStatus::OkShowStationBanner, banner)
    }

    async fn fetch(&self) -> Result<[Prediction; 2], ProviderError> {
        let now = self.clock.now().ok_or(ProviderError::ClockUnavailable)?;
        let raw = with_deadline(self.deadline, self.source.predictions(self.station)).await?;
        debug!("Transit: {} predictions for {}", raw.len(), self.station);
        select_predictions(&raw, self.layout, self.direction, now)
    }
}

#[async_trait]
impl Provider for TransitProvider {
    fn mode(&self) -> SignMode {
        SignMode::Transit
    }

    fn name(&self) -> &'static str {
        "transit"
    }

    async fn poll(&mut self) -> RenderMessage {
        match self.fetch().await {
            Ok(predictions) => {
                let status = match arriving_slot(&self.last_shown, &predictions) {
                    Some(slot) => PredictionStatus::OkShowArrivingBanner(slot),
                    None if predictions == self.last_shown => PredictionStatus::Skip,
                    None => PredictionStatus::Ok,
                };
                self.last_shown = predictions;
                RenderMessage::transit(status, predictions)
            }
            Err(e) => {
                warn!("Transit: {} ({})", e, self.station);
                RenderMessage::transit(PredictionStatus::Error, self.last_shown)
            }
        }
    }

    async fn handle_command(&mut self, cmd: ProviderCommand) -> Option<RenderMessage> {
        match cmd {
            ProviderCommand::SetStation(station) => {
                info!("Transit: now watching {} ({})", station, station.code());
                Some(self.set_station(station))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::clock::tests::{FixedClock, at};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn raw(direction: Direction, now: DateTime<Utc>, arr: Option<i64>, dep: Option<i64>) -> RawPrediction {
        RawPrediction {
            direction,
            arrival: arr.map(|s| now + chrono::Duration::seconds(s)),
            departure: dep.map(|s| now + chrono::Duration::seconds(s)),
            status: None,
            headsign: Some(match direction {
                Direction::Southbound => "Ashmont".to_string(),
                Direction::Northbound => "Alewife".to_string(),
            }),
        }
    }

    /// Replays canned responses, one per poll.
    struct Scripted(Mutex<VecDeque<Result<Vec<RawPrediction>, ProviderError>>>);

    #[async_trait]
    impl TransitSource for Scripted {
        async fn predictions(&self, _station: Station) -> Result<Vec<RawPrediction>, ProviderError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::NotFound("script exhausted".into())))
        }
    }

    fn provider(script: Vec<Result<Vec<RawPrediction>, ProviderError>>) -> TransitProvider {
        TransitProvider::new(
            Arc::new(Scripted(Mutex::new(script.into()))),
            at(12, 0, 0),
            Station::Harvard,
            SlotLayout::BothDirections,
            Direction::Southbound,
            Duration::from_secs(1),
        )
    }

    fn status_of(msg: &RenderMessage) -> PredictionStatus {
        match &msg.content {
            crate::render::RenderContent::Transit(t) => t.status,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tokens() {
        assert_eq!(prediction_token(None, Some(90), Some(120)), "1 min");
        assert_eq!(prediction_token(None, Some(600), None), "10 min");
        assert_eq!(prediction_token(None, Some(30), Some(60)), "ARR");
        assert_eq!(prediction_token(None, Some(60), Some(90)), "ARR");
        assert_eq!(prediction_token(None, Some(-5), Some(10)), "BRD");
        assert_eq!(prediction_token(None, Some(-5), Some(-5)), "ERROR");
        assert_eq!(prediction_token(None, None, None), "ERROR");
        assert_eq!(prediction_token(Some("Stopped 2 stops away"), None, None), "STOP");
        assert_eq!(prediction_token(Some("Approaching"), None, None), "approa");
    }

    #[test]
    fn test_first_stop_counts_down_on_departure_not_error() {
        // first stop of a trip has no arrival time
        assert_eq!(prediction_token(None, None, Some(200)), "3 min");
        assert_eq!(prediction_token(None, None, Some(40)), "ARR");
        // nothing to count down on at all
        assert_eq!(prediction_token(None, None, None), "ERROR");
        // arrival without departure: past arrivals cannot board
        assert_eq!(prediction_token(None, Some(-5), None), "ERROR");
    }

    #[test]
    fn test_station_codes_are_bijective() {
        let mut codes: Vec<_> = Station::ALL.iter().map(|s| s.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), Station::ALL.len());
        for s in Station::ALL {
            assert_eq!(Station::from_code(s.code()), Some(s));
        }
    }

    #[test]
    fn test_parse_station() {
        assert_eq!("porter".parse::<Station>(), Ok(Station::Porter));
        assert_eq!("Park Street".parse::<Station>(), Ok(Station::ParkStreet));
        assert_eq!("charles_mgh".parse::<Station>(), Ok(Station::CharlesMgh));
        assert_eq!("place-knncl".parse::<Station>(), Ok(Station::Kendall));
        assert_eq!("9".parse::<Station>(), Ok(Station::SouthStation));
        assert!(matches!("10".parse::<Station>(), Err(ControlError::InvalidStation(_))));
        assert!(matches!("Braintree".parse::<Station>(), Err(ControlError::InvalidStation(_))));
    }

    #[test]
    fn test_select_skips_departed_trains() {
        let now = at(12, 0, 0).now().unwrap();
        let feed = vec![
            raw(Direction::Southbound, now, Some(-120), Some(-100)),
            raw(Direction::Southbound, now, Some(240), Some(260)),
            raw(Direction::Northbound, now, Some(45), Some(70)),
        ];
        let board = select_predictions(&feed, SlotLayout::BothDirections, Direction::Southbound, now).unwrap();
        assert_eq!(board[0].label.as_str(), "Ashmont");
        assert_eq!(board[0].value.as_str(), "4 min");
        assert_eq!(board[1].label.as_str(), "Alewife");
        assert_eq!(board[1].value.as_str(), "ARR");
    }

    #[test]
    fn test_select_one_direction_takes_two() {
        let now = at(12, 0, 0).now().unwrap();
        let feed = vec![
            raw(Direction::Northbound, now, Some(100), Some(120)),
            raw(Direction::Southbound, now, Some(130), Some(150)),
            raw(Direction::Northbound, now, Some(400), Some(420)),
        ];
        let board = select_predictions(&feed, SlotLayout::OneDirection, Direction::Northbound, now).unwrap();
        assert_eq!(board[0].value.as_str(), "1 min");
        assert_eq!(board[1].value.as_str(), "6 min");

        // only one southbound train: second slot cannot be filled
        assert!(select_predictions(&feed, SlotLayout::OneDirection, Direction::Southbound, now).is_err());
    }

    #[tokio::test]
    async fn test_arriving_banner_fires_once() {
        let now = at(12, 0, 0).now().unwrap();
        let poll = |arr: i64| {
            Ok(vec![
                raw(Direction::Southbound, now, Some(arr), Some(arr + 20)),
                raw(Direction::Northbound, now, Some(900), Some(920)),
            ])
        };
        let mut p = provider(vec![poll(300), poll(30), poll(20)]);

        assert_eq!(status_of(&p.poll().await), PredictionStatus::Ok);
        assert_eq!(status_of(&p.poll().await), PredictionStatus::OkShowArrivingBanner(0));
        // still "ARR" and nothing else changed
        assert_eq!(status_of(&p.poll().await), PredictionStatus::Skip);
    }

    #[tokio::test]
    async fn test_error_keeps_cache() {
        let now = at(12, 0, 0).now().unwrap();
        let good = Ok(vec![
            raw(Direction::Southbound, now, Some(300), Some(320)),
            raw(Direction::Northbound, now, Some(400), Some(420)),
        ]);
        let mut p = provider(vec![good, Err(ProviderError::Timeout(Duration::from_secs(1)))]);
        p.poll().await;
        let before = *p.last_shown();

        let msg = p.poll().await;
        assert_eq!(status_of(&msg), PredictionStatus::Error);
        assert_eq!(*p.last_shown(), before);
    }

    #[tokio::test]
    async fn test_station_change_resets_and_banners() {
        let now = at(12, 0, 0).now().unwrap();
        let mut p = provider(vec![Ok(vec![
            raw(Direction::Southbound, now, Some(30), Some(50)),
            raw(Direction::Northbound, now, Some(400), Some(420)),
        ])]);
        p.poll().await;

        let msg = p.handle_command(ProviderCommand::SetStation(Station::Davis)).await.unwrap();
        assert_eq!(status_of(&msg), PredictionStatus::OkShowStationBanner);
        match &msg.content {
            crate::render::RenderContent::Transit(t) => assert_eq!(t.predictions[0].label.as_str(), "Davis"),
            _ => unreachable!(),
        }
        assert_eq!(p.station(), Station::Davis);
        assert_eq!(*p.last_shown(), placeholder_predictions());
    }

    #[tokio::test]
    async fn test_unset_clock_is_error() {
        let mut p = provider(vec![Ok(vec![])]);
        p.clock = Arc::new(FixedClock(None));
        assert_eq!(status_of(&p.poll().await), PredictionStatus::Error);
    }
}
