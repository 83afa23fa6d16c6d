//! Call-counting in-memory collaborator used by the tests.

use crate::error::CatastoError;
use crate::models::{ConnectionProfile, Table, Value};
use crate::services::collaborator::{Collaborator, ProcedureId, ProcedureResult, QueryId};

use std::collections::HashMap;

/// Handle given out by [`FakeCollaborator`].
#[derive(Debug)]
pub struct FakeHandle {
    pub id: u32,
}

/// Scriptable collaborator that records every call.
#[derive(Debug, Default)]
pub struct FakeCollaborator {
    /// Password that makes `acquire_connection` fail with an authentication error.
    pub rejected_password: Option<String>,
    /// Schema that makes `apply_schema_scope` fail.
    pub missing_schema: Option<String>,
    /// Canned query results.
    pub tables: HashMap<QueryId, Table>,
    /// Canned procedure results.
    pub procedures: HashMap<ProcedureId, ProcedureResult>,
    /// Error returned by every query and procedure when set.
    pub fail_with: Option<String>,

    pub acquired: u32,
    pub schema_scopes: Vec<String>,
    pub released: Vec<u32>,
    pub queries: Vec<(QueryId, Vec<Value>)>,
    pub procedure_calls: Vec<(ProcedureId, Vec<Value>)>,
}

impl FakeCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(password: &str) -> Self {
        Self { rejected_password: Some(password.to_string()), ..Self::default() }
    }

    pub fn with_table(mut self, query: QueryId, table: Table) -> Self {
        self.tables.insert(query, table);
        self
    }

    pub fn with_procedure(mut self, procedure: ProcedureId, result: ProcedureResult) -> Self {
        self.procedures.insert(procedure, result);
        self
    }

    /// Every collaborator call made so far, connection lifecycle included.
    pub fn total_calls(&self) -> usize {
        self.acquired as usize
            + self.schema_scopes.len()
            + self.released.len()
            + self.queries.len()
            + self.procedure_calls.len()
    }

    /// Queries and procedure calls made so far.
    pub fn command_calls(&self) -> usize {
        self.queries.len() + self.procedure_calls.len()
    }
}

impl Collaborator for FakeCollaborator {
    type Handle = FakeHandle;

    fn acquire_connection(&mut self, profile: &ConnectionProfile) -> Result<FakeHandle, CatastoError> {
        if self.rejected_password.as_deref() == Some(profile.secret().expose()) {
            return Err(CatastoError::authentication(format!(
                "password authentication failed for user \"{}\"",
                profile.user()
            )));
        }
        self.acquired += 1;
        Ok(FakeHandle { id: self.acquired })
    }

    fn apply_schema_scope(&mut self, _handle: &mut FakeHandle, schema: &str) -> Result<(), CatastoError> {
        self.schema_scopes.push(schema.to_string());
        if self.missing_schema.as_deref() == Some(schema) {
            return Err(CatastoError::collaborator(format!("schema \"{schema}\" does not exist")));
        }
        Ok(())
    }

    fn release_connection(&mut self, handle: FakeHandle) {
        self.released.push(handle.id);
    }

    fn run_query(
        &mut self,
        _handle: &mut FakeHandle,
        query: QueryId,
        params: &[Value],
    ) -> Result<Table, CatastoError> {
        self.queries.push((query, params.to_vec()));
        if let Some(message) = &self.fail_with {
            return Err(CatastoError::collaborator(message.clone()));
        }
        Ok(self.tables.get(&query).cloned().unwrap_or_default())
    }

    fn run_procedure(
        &mut self,
        _handle: &mut FakeHandle,
        procedure: ProcedureId,
        params: &[Value],
    ) -> Result<ProcedureResult, CatastoError> {
        self.procedure_calls.push((procedure, params.to_vec()));
        if let Some(message) = &self.fail_with {
            return Err(CatastoError::collaborator(message.clone()));
        }
        Ok(self.procedures.get(&procedure).cloned().unwrap_or_default())
    }
}
