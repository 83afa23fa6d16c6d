//! The database collaborator boundary.
//!
//! The session never sees SQL. It asks a [`Collaborator`] for a connection
//! handle, scopes it to a schema, and runs named queries and procedures on it.
//! Which statement backs each name is the collaborator's business.

use crate::error::CatastoError;
use crate::models::{ConnectionProfile, Table, Value};

/// Named read queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryId {
    /// All comuni ordered by name
    Municipalities,
    /// First page of partite with aggregated owner names
    Partite,
    /// Partite whose comune matches a pattern
    PartiteByComune,
    /// First page of possessori
    Possessori,
    /// Full-text owner search
    SearchPossessori,
    /// Active possessori of one comune
    PossessoriByComune,
    /// Partite held by one possessore
    PartiteByPossessore,
    /// First page of immobili
    Immobili,
    /// Immobili by comune and/or natura
    SearchImmobili,
    /// Next free partita number in a comune
    NextPartitaNumber,
    /// One partita with its owners and immobili
    PartitaDetails,
    /// One possessore with the partite it holds
    PossessoreDetails,
    /// One immobile with its località, partita and owners
    ImmobileDetails,
    /// Immobili held by one possessore
    ImmobiliByPossessore,
    /// Consultazioni by date range, requester and official
    SearchConsultazioni,
}

impl QueryId {
    /// Stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Municipalities => "municipalities",
            Self::Partite => "partite",
            Self::PartiteByComune => "partite_by_comune",
            Self::Possessori => "possessori",
            Self::SearchPossessori => "search_possessori",
            Self::PossessoriByComune => "possessori_by_comune",
            Self::PartiteByPossessore => "partite_by_possessore",
            Self::Immobili => "immobili",
            Self::SearchImmobili => "search_immobili",
            Self::NextPartitaNumber => "next_partita_number",
            Self::PartitaDetails => "partita_details",
            Self::PossessoreDetails => "possessore_details",
            Self::ImmobileDetails => "immobile_details",
            Self::ImmobiliByPossessore => "immobili_by_possessore",
            Self::SearchConsultazioni => "search_consultazioni",
        }
    }
}

/// Named stored-routine calls and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcedureId {
    /// Property certificate text for a partita
    PropertyCertificate,
    /// Genealogy report text for a partita
    GenealogyReport,
    /// Historical report text for a possessore
    OwnerReport,
    /// Integrity verification, returns a problems-found flag
    IntegrityCheck,
    /// Automatic integrity repair
    IntegrityRepair,
    /// Logical backup to a server-side directory
    LogicalBackup,
    /// Insert a possessore
    InsertPossessore,
    /// Insert a partita together with its owners
    InsertPartita,
    /// Set a possessore active or inactive, returns rows affected
    UpdatePossessore,
    /// JSON document describing a partita
    ExportPartitaJson,
    /// Record a consultation of the archive
    RegisterConsultazione,
}

impl ProcedureId {
    /// Stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropertyCertificate => "property_certificate",
            Self::GenealogyReport => "genealogy_report",
            Self::OwnerReport => "owner_report",
            Self::IntegrityCheck => "integrity_check",
            Self::IntegrityRepair => "integrity_repair",
            Self::LogicalBackup => "logical_backup",
            Self::InsertPossessore => "insert_possessore",
            Self::InsertPartita => "insert_partita",
            Self::UpdatePossessore => "update_possessore",
            Self::ExportPartitaJson => "export_partita_json",
            Self::RegisterConsultazione => "register_consultazione",
        }
    }
}

/// What a procedure call returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcedureResult {
    /// Returned scalar (text, flag, rows affected), or NULL
    pub value: Option<Value>,
    /// Server notices raised during the call, in order
    pub notices: Vec<String>,
}

impl ProcedureResult {
    /// Result carrying a value and no notices.
    pub fn with_value(value: Value) -> Self {
        Self { value: Some(value), notices: Vec::new() }
    }

    /// Result carrying nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returned text, if the value is non-null text.
    pub fn text(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_text)
    }
}

/// Capabilities the session needs from the database.
pub trait Collaborator {
    /// Live connection resource, exclusively owned by the session.
    type Handle;

    /// Open a connection for the profile.
    fn acquire_connection(&mut self, profile: &ConnectionProfile)
        -> Result<Self::Handle, CatastoError>;

    /// Restrict name resolution to the given schema.
    fn apply_schema_scope(
        &mut self,
        handle: &mut Self::Handle,
        schema: &str,
    ) -> Result<(), CatastoError>;

    /// Close a connection. Best-effort, never fails.
    fn release_connection(&mut self, handle: Self::Handle);

    /// Run a named read query.
    fn run_query(
        &mut self,
        handle: &mut Self::Handle,
        query: QueryId,
        params: &[Value],
    ) -> Result<Table, CatastoError>;

    /// Run a named procedure or write.
    fn run_procedure(
        &mut self,
        handle: &mut Self::Handle,
        procedure: ProcedureId,
        params: &[Value],
    ) -> Result<ProcedureResult, CatastoError>;
}

/// A collaborator bound to a live handle: all a command handler may touch.
pub trait Gateway {
    /// Run a named read query.
    fn run_query(&mut self, query: QueryId, params: &[Value]) -> Result<Table, CatastoError>;

    /// Run a named procedure or write.
    fn run_procedure(
        &mut self,
        procedure: ProcedureId,
        params: &[Value],
    ) -> Result<ProcedureResult, CatastoError>;
}

/// [`Gateway`] over a collaborator and one of its handles.
pub struct BoundGateway<'a, C: Collaborator> {
    collaborator: &'a mut C,
    handle: &'a mut C::Handle,
}

impl<'a, C: Collaborator> BoundGateway<'a, C> {
    /// Bind a collaborator to a handle.
    pub fn new(collaborator: &'a mut C, handle: &'a mut C::Handle) -> Self {
        Self { collaborator, handle }
    }
}

impl<C: Collaborator> Gateway for BoundGateway<'_, C> {
    fn run_query(&mut self, query: QueryId, params: &[Value]) -> Result<Table, CatastoError> {
        tracing::debug!(query = query.as_str(), params = params.len(), "Running query");
        let result = self.collaborator.run_query(self.handle, query, params);
        match &result {
            Ok(table) => tracing::debug!(query = query.as_str(), rows = table.len(), "Query completed"),
            Err(e) => tracing::warn!(query = query.as_str(), error = %e, "Query failed"),
        }
        result
    }

    fn run_procedure(
        &mut self,
        procedure: ProcedureId,
        params: &[Value],
    ) -> Result<ProcedureResult, CatastoError> {
        tracing::debug!(procedure = procedure.as_str(), params = params.len(), "Calling procedure");
        let result = self.collaborator.run_procedure(self.handle, procedure, params);
        match &result {
            Ok(r) => tracing::debug!(
                procedure = procedure.as_str(),
                notices = r.notices.len(),
                "Procedure completed"
            ),
            Err(e) => tracing::warn!(procedure = procedure.as_str(), error = %e, "Procedure failed"),
        }
        result
    }
}
