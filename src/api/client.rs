//! Purpose: Top-level client surface mapping resource accessors to endpoints.
//! Exports: `ElabClient`, `TeamScope`, `TeamRef`, `CategoryRef`.
//! Role: Owns the transport; materializes typed resources and export jobs.
//! Invariants: One `Session` per client; the client holds no mutable state,
//! Invariants: so it is safe to share across threads for blocking calls.
#![allow(clippy::result_large_err)]

use crate::api::pages::{Filter, ListQuery, RecordPages};
use crate::api::resources::{Experiment, Item, Listable, Listing, Team, User};
use crate::api::session::Session;
use crate::api::transport::Transport;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;
use crate::export::{self, EntityKind, ExportFormat, ExportReport};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Which team a scoped call addresses. `Current` resolves to the team the
/// API key belongs to, mirroring the upstream `teams/current` endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeamRef {
    Current,
    Id(i64),
}

/// An experiment category, by id or by its team-local title.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CategoryRef {
    Id(i64),
    Title(String),
}

#[derive(Serialize)]
struct CategoryPatch {
    category: i64,
}

pub struct ElabClient {
    session: Session,
    transport: Transport,
}

impl ElabClient {
    pub fn new(session: Session) -> Result<Self, Error> {
        let transport = Transport::new(&session)?;
        Ok(Self { session, transport })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn get_record(&self, segments: &[&str], id: i64) -> Result<Record, Error> {
        let value = self
            .transport
            .get_json(segments, &[])
            .map_err(|err| err.with_resource(id))?;
        Record::from_value(value)
    }

    fn listing<T: Listable>(&self, query: ListQuery) -> Listing<'_, T> {
        Listing::new(RecordPages::new(&self.transport, T::endpoint(), query))
    }

    // --- experiments ---

    pub fn get_experiment(&self, id: i64) -> Result<Experiment, Error> {
        self.get_record(&["experiments", &id.to_string()], id)
            .map(Experiment::from_record)
    }

    pub fn list_experiments(&self, query: ListQuery) -> Listing<'_, Experiment> {
        self.listing(query)
    }

    pub fn get_experiments(&self) -> Result<Vec<Experiment>, Error> {
        self.list_experiments(ListQuery::new()).collect_all()
    }

    pub fn get_experiments_by_status(&self, status: &str) -> Result<Vec<Experiment>, Error> {
        self.list_experiments(ListQuery::new().with_filter(Filter::Status(status.to_string())))
            .collect_all()
    }

    pub fn get_experiments_by_category(&self, category: &str) -> Result<Vec<Experiment>, Error> {
        self.list_experiments(ListQuery::new().with_filter(Filter::Category(category.to_string())))
            .collect_all()
    }

    /// Move an experiment into a category, resolving a title against the
    /// current team's category list first. Returns the updated record.
    pub fn set_experiment_category(
        &self,
        experiment_id: i64,
        category: CategoryRef,
    ) -> Result<Experiment, Error> {
        let category_id = match category {
            CategoryRef::Id(id) => id,
            CategoryRef::Title(title) => {
                let team = self.team(TeamRef::Current)?;
                let found = team.experiment_category_by_title(&title)?.ok_or_else(|| {
                    Error::new(ErrorKind::Usage).with_message(format!(
                        "category \"{title}\" was not found in this team's list of categories"
                    ))
                })?;
                found.id()?
            }
        };
        let value = self
            .transport
            .patch_json(
                &["experiments", &experiment_id.to_string()],
                &CategoryPatch {
                    category: category_id,
                },
            )
            .map_err(|err| err.with_resource(experiment_id))?;
        Record::from_value(value).map(Experiment::from_record)
    }

    // --- items ---

    pub fn get_item(&self, id: i64) -> Result<Item, Error> {
        self.get_record(&["items", &id.to_string()], id)
            .map(Item::from_record)
    }

    pub fn list_items(&self, query: ListQuery) -> Listing<'_, Item> {
        self.listing(query)
    }

    pub fn get_items_by_status(&self, status: &str) -> Result<Vec<Item>, Error> {
        self.list_items(ListQuery::new().with_filter(Filter::Status(status.to_string())))
            .collect_all()
    }

    // --- teams and users ---

    pub fn get_team(&self, team: TeamRef) -> Result<Team, Error> {
        let record = match team {
            TeamRef::Current => {
                let value = self.transport.get_json(&["teams", "current"], &[])?;
                Record::from_value(value)?
            }
            TeamRef::Id(id) => self.get_record(&["teams", &id.to_string()], id)?,
        };
        Ok(Team::from_record(record))
    }

    pub fn list_teams(&self, query: ListQuery) -> Listing<'_, Team> {
        self.listing(query)
    }

    pub fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, Error> {
        for team in self.list_teams(ListQuery::new()) {
            let team = team?;
            if team.name().as_deref() == Some(name) {
                return Ok(Some(team));
            }
        }
        Ok(None)
    }

    pub fn get_user(&self, id: i64) -> Result<User, Error> {
        self.get_record(&["users", &id.to_string()], id)
            .map(User::from_record)
    }

    pub fn list_users(&self, query: ListQuery) -> Listing<'_, User> {
        self.listing(query)
    }

    /// Scope subsequent team-local calls (categories, statuses, tags) to one
    /// team. Fetches the team record up front so the id is fixed even when
    /// constructed from `TeamRef::Current`.
    pub fn team(&self, team: TeamRef) -> Result<TeamScope<'_>, Error> {
        let record = self.get_team(team)?.into_record();
        let team_id = record.id()?;
        Ok(TeamScope {
            client: self,
            team_id,
            record,
        })
    }

    // --- instance-wide reads ---

    pub fn server_config(&self) -> Result<Record, Error> {
        let value = self.transport.get_json(&["config"], &[])?;
        Record::from_value(value)
    }

    pub fn api_keys(&self) -> Result<Vec<Record>, Error> {
        let value = self.transport.get_json(&["apikeys"], &[])?;
        records_from_array(value)
    }

    // --- exports ---

    pub fn export_experiment(
        &self,
        id: i64,
        format: ExportFormat,
        destination: impl AsRef<Path>,
    ) -> Result<ExportReport, Error> {
        export::run_single(
            &self.transport,
            EntityKind::Experiments,
            id,
            format,
            destination.as_ref(),
        )
    }

    /// Batch ELN export. Fetch failures for individual resources are recorded
    /// per item in the report; only assembly failures abort the job.
    pub fn export_experiments_eln(
        &self,
        ids: &[i64],
        destination: impl AsRef<Path>,
    ) -> Result<ExportReport, Error> {
        export::eln::export_eln(
            &self.transport,
            EntityKind::Experiments,
            ids,
            destination.as_ref(),
        )
    }

    pub fn export_item(
        &self,
        id: i64,
        format: ExportFormat,
        destination: impl AsRef<Path>,
    ) -> Result<ExportReport, Error> {
        export::run_single(
            &self.transport,
            EntityKind::Items,
            id,
            format,
            destination.as_ref(),
        )
    }

    pub fn export_items_eln(
        &self,
        ids: &[i64],
        destination: impl AsRef<Path>,
    ) -> Result<ExportReport, Error> {
        export::eln::export_eln(&self.transport, EntityKind::Items, ids, destination.as_ref())
    }

    /// Raw transport escape hatch for endpoints the typed surface does not
    /// cover, mirroring the original client's generic request hook.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

/// Team-scoped reads. Category and status vocabularies are team-local
/// upstream, so they live here rather than on the client.
pub struct TeamScope<'a> {
    client: &'a ElabClient,
    team_id: i64,
    record: Record,
}

impl TeamScope<'_> {
    pub fn id(&self) -> i64 {
        self.team_id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn experiment_categories(&self) -> Result<Vec<Record>, Error> {
        self.team_collection("experiments_categories")
    }

    pub fn experiment_category_by_title(&self, title: &str) -> Result<Option<Record>, Error> {
        Ok(find_by_title(self.experiment_categories()?, title))
    }

    pub fn experiment_statuses(&self) -> Result<Vec<Record>, Error> {
        self.team_collection("experiments_status")
    }

    pub fn experiment_status_by_title(&self, title: &str) -> Result<Option<Record>, Error> {
        Ok(find_by_title(self.experiment_statuses()?, title))
    }

    pub fn item_statuses(&self) -> Result<Vec<Record>, Error> {
        self.team_collection("items_status")
    }

    pub fn item_status_by_title(&self, title: &str) -> Result<Option<Record>, Error> {
        Ok(find_by_title(self.item_statuses()?, title))
    }

    pub fn tags(&self) -> Result<Vec<Record>, Error> {
        let value = self.client.transport().get_json(&["team_tags"], &[])?;
        records_from_array(value)
    }

    /// A single team tag; a 404 means the tag does not exist and maps to
    /// `None`, matching the original client's behavior.
    pub fn tag(&self, id: i64) -> Result<Option<Record>, Error> {
        match self
            .client
            .transport()
            .get_json(&["team_tags", &id.to_string()], &[])
        {
            Ok(value) => Ok(Some(Record::from_value(value)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn team_collection(&self, collection: &str) -> Result<Vec<Record>, Error> {
        let team_id = self.team_id.to_string();
        let value = self
            .client
            .transport()
            .get_json(&["teams", &team_id, collection], &[])?;
        records_from_array(value)
    }
}

fn records_from_array(value: Value) -> Result<Vec<Record>, Error> {
    match value {
        Value::Array(items) => items.into_iter().map(Record::from_value).collect(),
        _ => Err(Error::new(ErrorKind::Internal).with_message("expected a JSON array response")),
    }
}

fn find_by_title(records: Vec<Record>, title: &str) -> Option<Record> {
    records
        .into_iter()
        .find(|record| record.text(&["title"]).as_deref() == Some(title))
}
