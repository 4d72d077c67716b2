/*
 *  providers/mbta.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  MBTA v3 predictions API
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
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::fetch::{Fetched, HttpClient, ProviderError};
use crate::providers::transit::{Direction, RawPrediction, Station, TransitSource};

// Only the fields we read; serde drops the rest of the JSON:API document.
#[derive(Debug, Deserialize)]
struct PredictionDocument {
    #[serde(default)]
    data: Vec<PredictionResource>,
    #[serde(default)]
    included: Vec<TripResource>,
}

#[derive(Debug, Deserialize)]
struct PredictionResource {
    attributes: PredictionAttributes,
    #[serde(default)]
    relationships: Option<Relationships>,
}

#[derive(Debug, Deserialize)]
struct PredictionAttributes {
    arrival_time: Option<DateTime<FixedOffset>>,
    departure_time: Option<DateTime<FixedOffset>>,
    status: Option<String>,
    direction_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct Relationships {
    trip: Option<Linkage>,
}

#[derive(Debug, Deserialize)]
struct Linkage {
    data: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TripResource {
    id: String,
    #[serde(default)]
    attributes: Option<TripAttributes>,
}

#[derive(Debug, Deserialize)]
struct TripAttributes {
    headsign: Option<String>,
}

/// Flatten the JSON:API document, joining each prediction with its trip.
fn flatten(doc: PredictionDocument) -> Vec<RawPrediction> {
    let headsigns: HashMap<String, String> = doc
        .included
        .into_iter()
        .filter_map(|trip| Some((trip.id, trip.attributes?.headsign?)))
        .collect();

    doc.data
        .into_iter()
        .filter_map(|p| {
            let direction = Direction::from_id(p.attributes.direction_id?)?;
            let trip_id = p.relationships.and_then(|r| r.trip).and_then(|t| t.data).map(|d| d.id);
            Some(RawPrediction {
                direction,
                arrival: p.attributes.arrival_time.map(|t| t.with_timezone(&Utc)),
                departure: p.attributes.departure_time.map(|t| t.with_timezone(&Utc)),
                status: p.attributes.status,
                headsign: trip_id.and_then(|id| headsigns.get(&id).cloned()),
            })
        })
        .collect()
}

/// Client for `GET /predictions` on one route.
#[derive(Debug, Clone)]
pub struct MbtaClient {
    http: HttpClient,
    base_url: String,
    route: String,
    api_key: Option<String>,
}

impl MbtaClient {
    pub fn new(http: HttpClient, base_url: &str, route: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            route: route.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl TransitSource for MbtaClient {
    async fn predictions(&self, station: Station) -> Result<Vec<RawPrediction>, ProviderError> {
        let url = format!("{}/predictions", self.base_url);
        let mut query = vec![
            ("filter[stop]", station.code().to_string()),
            ("filter[route]", self.route.clone()),
            ("fields[prediction]", "arrival_time,departure_time,status,direction_id".to_string()),
            ("include", "trip".to_string()),
            ("sort", "arrival_time".to_string()),
        ];
        // anonymous access works at a lower rate limit
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }
        let request = self.http.get(&url).query(&query);
        match self.http.fetch_json::<PredictionDocument>(request).await? {
            Fetched::Document(doc) => Ok(flatten(doc)),
            Fetched::Empty => Ok(Vec::new()),
        }
    }
}
