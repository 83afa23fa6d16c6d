//! SQL text behind each named query and procedure.
//!
//! Statements rely on the session's search path (see [`search_path_statement`])
//! instead of schema-qualifying every name. Parameters carry explicit casts so
//! the bound Rust types line up with what the server infers.

use crate::error::CatastoError;
use crate::models::connection::is_plain_identifier;
use crate::services::collaborator::{ProcedureId, QueryId};

/// Listing queries stop after this many rows.
pub const PAGE_SIZE: usize = 50;

/// How a procedure's result is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    /// First column of the first row
    Scalar,
    /// Number of rows the statement touched
    RowsAffected,
    /// Nothing beyond success
    Nothing,
}

/// Statement and result shape for a procedure.
#[derive(Debug, Clone, Copy)]
pub struct ProcedureSql {
    /// Statement text
    pub sql: &'static str,
    /// How to read the result
    pub returns: Returns,
}

/// SQL for a named query.
pub fn query_sql(query: QueryId) -> &'static str {
    match query {
        QueryId::Municipalities => "SELECT nome, provincia, regione FROM comune ORDER BY nome",
        QueryId::Partite => {
            "SELECT p.id, p.comune_nome, p.numero_partita, p.tipo, p.stato, \
                    string_agg(pos.nome_completo, ', ') AS possessori \
             FROM partita p \
             LEFT JOIN partita_possessore pp ON p.id = pp.partita_id \
             LEFT JOIN possessore pos ON pp.possessore_id = pos.id \
             GROUP BY p.id, p.comune_nome, p.numero_partita, p.tipo, p.stato \
             ORDER BY p.comune_nome, p.numero_partita \
             LIMIT 50"
        }
        QueryId::PartiteByComune => {
            "SELECT p.id, p.comune_nome, p.numero_partita, p.tipo \
             FROM partita p \
             WHERE p.comune_nome ILIKE $1::text \
             ORDER BY p.comune_nome, p.numero_partita \
             LIMIT 50"
        }
        QueryId::Possessori => {
            "SELECT id, nome_completo, comune_nome, attivo \
             FROM possessore \
             ORDER BY comune_nome, nome_completo \
             LIMIT 50"
        }
        QueryId::SearchPossessori => {
            "SELECT * FROM cerca_possessori($1::text)"
        }
        QueryId::PossessoriByComune => {
            "SELECT id, nome_completo \
             FROM possessore \
             WHERE comune_nome = $1::text AND attivo = TRUE \
             ORDER BY nome_completo"
        }
        QueryId::PartiteByPossessore => {
            "SELECT p.id, p.comune_nome, p.numero_partita, p.tipo, p.stato, \
                    pp.titolo, pp.quota::text AS quota \
             FROM partita p \
             JOIN partita_possessore pp ON p.id = pp.partita_id \
             WHERE pp.possessore_id = $1::integer \
             ORDER BY p.comune_nome, p.numero_partita"
        }
        QueryId::Immobili => {
            "SELECT i.id, i.natura, l.nome AS localita, p.numero_partita, p.comune_nome \
             FROM immobile i \
             JOIN localita l ON i.localita_id = l.id \
             JOIN partita p ON i.partita_id = p.id \
             ORDER BY p.comune_nome, p.numero_partita \
             LIMIT 50"
        }
        QueryId::SearchImmobili => {
            "SELECT * FROM cerca_immobili(NULL, $1::text, NULL, $2::text, NULL)"
        }
        QueryId::NextPartitaNumber => {
            "SELECT COALESCE(MAX(numero_partita), 0) + 1 AS prossimo_numero \
             FROM partita WHERE comune_nome = $1::text"
        }
        QueryId::PartitaDetails => {
            "SELECT p.id, p.comune_nome, p.numero_partita, p.tipo, p.stato, \
                    p.data_impianto, p.data_chiusura, \
                    (SELECT string_agg(pos.nome_completo, ', ' ORDER BY pos.nome_completo) \
                     FROM partita_possessore pp \
                     JOIN possessore pos ON pp.possessore_id = pos.id \
                     WHERE pp.partita_id = p.id) AS possessori, \
                    (SELECT string_agg(i.natura || ' in ' || l.nome \
                                       || COALESCE(' (' || i.classificazione || ')', ''), \
                                       E'\\n' ORDER BY i.id) \
                     FROM immobile i \
                     JOIN localita l ON i.localita_id = l.id \
                     WHERE i.partita_id = p.id) AS immobili \
             FROM partita p \
             WHERE p.id = $1::integer"
        }
        QueryId::PossessoreDetails => {
            "SELECT pos.id, pos.nome_completo, pos.cognome_nome, pos.paternita, pos.comune_nome, \
                    CASE WHEN pos.attivo THEN 'attivo' ELSE 'non attivo' END AS stato, \
                    (SELECT string_agg('Partita ' || p.numero_partita || ' in ' || p.comune_nome \
                                       || ' (' || p.tipo || ', ' || p.stato || ')' \
                                       || COALESCE(' - ' || pp.titolo \
                                          || COALESCE(' (quota ' || pp.quota || ')', ''), ''), \
                                       E'\\n' ORDER BY p.comune_nome, p.numero_partita) \
                     FROM partita p \
                     JOIN partita_possessore pp ON p.id = pp.partita_id \
                     WHERE pp.possessore_id = pos.id) AS partite \
             FROM possessore pos \
             WHERE pos.id = $1::integer"
        }
        QueryId::ImmobileDetails => {
            "SELECT i.id, i.natura, l.nome || COALESCE(' (' || l.tipo || ')', '') AS localita, \
                    i.classificazione, NULLIF(i.numero_piani, 0) AS numero_piani, \
                    NULLIF(i.numero_vani, 0) AS numero_vani, i.consistenza, \
                    p.numero_partita, p.comune_nome, p.tipo AS partita_tipo, \
                    (SELECT string_agg(pos.nome_completo \
                                       || COALESCE(' - ' || pp.titolo \
                                          || COALESCE(' (quota ' || pp.quota || ')', ''), ''), \
                                       E'\\n' ORDER BY pos.nome_completo) \
                     FROM possessore pos \
                     JOIN partita_possessore pp ON pos.id = pp.possessore_id \
                     WHERE pp.partita_id = p.id) AS possessori \
             FROM immobile i \
             JOIN localita l ON i.localita_id = l.id \
             JOIN partita p ON i.partita_id = p.id \
             WHERE i.id = $1::integer"
        }
        QueryId::ImmobiliByPossessore => "SELECT * FROM get_immobili_possessore($1::integer)",
        QueryId::SearchConsultazioni => {
            "SELECT * FROM cerca_consultazioni($1::date, $2::date, $3::text, $4::text)"
        }
    }
}

/// SQL and result shape for a named procedure.
pub fn procedure_sql(procedure: ProcedureId) -> ProcedureSql {
    let (sql, returns) = match procedure {
        ProcedureId::PropertyCertificate => {
            ("SELECT genera_certificato_proprieta($1::integer)", Returns::Scalar)
        }
        ProcedureId::GenealogyReport => {
            ("SELECT genera_report_genealogico($1::integer)", Returns::Scalar)
        }
        ProcedureId::OwnerReport => ("SELECT genera_report_possessore($1::integer)", Returns::Scalar),
        ProcedureId::IntegrityCheck => ("CALL verifica_integrita_database(NULL)", Returns::Scalar),
        ProcedureId::IntegrityRepair => {
            ("CALL ripara_problemi_database($1::boolean)", Returns::Nothing)
        }
        ProcedureId::LogicalBackup => ("CALL backup_logico_dati($1::text, $2::text)", Returns::Nothing),
        ProcedureId::InsertPossessore => (
            "CALL inserisci_possessore($1::text, $2::text, $3::text, $4::text, $5::boolean)",
            Returns::Nothing,
        ),
        ProcedureId::InsertPartita => (
            "CALL inserisci_partita_con_possessori($1::text, $2::integer, $3::text, $4::date, $5::integer[])",
            Returns::Nothing,
        ),
        ProcedureId::UpdatePossessore => (
            "UPDATE possessore SET attivo = $1::boolean WHERE id = $2::integer",
            Returns::RowsAffected,
        ),
        ProcedureId::ExportPartitaJson => {
            ("SELECT esporta_partita_json($1::integer)::text", Returns::Scalar)
        }
        ProcedureId::RegisterConsultazione => (
            "CALL registra_consultazione($1::date, $2::text, $3::text, $4::text, $5::text, $6::text)",
            Returns::Nothing,
        ),
    };
    ProcedureSql { sql, returns }
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Statement that scopes name resolution to `schema`.
pub fn search_path_statement(schema: &str) -> Result<String, CatastoError> {
    if !is_plain_identifier(schema) {
        return Err(CatastoError::schema_scope(schema, "nome di schema non valido"));
    }
    Ok(format!("SET search_path TO {}", quote_ident(schema)))
}

/// Highest `$n` placeholder in a statement.
pub fn placeholder_count(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start {
                if let Ok(n) = sql[start..end].parse::<usize>() {
                    max = max.max(n);
                }
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }
    max
}
