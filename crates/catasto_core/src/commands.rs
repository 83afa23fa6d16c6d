//! Command registry and the handlers behind each menu entry.
//!
//! A handler parses every input it needs from [`CommandArgs`] first and only
//! then makes its single call through the [`Gateway`], so malformed input
//! never reaches the database.

use crate::error::CatastoError;
use crate::models::{Availability, CommandArgs, InputKind, InputSpec, Payload, Table, Value};
use crate::services::collaborator::{Gateway, ProcedureId, ProcedureResult, QueryId};

use chrono::{Local, NaiveDate};

/// Handler signature for commands that talk to the database.
pub type Handler = fn(&mut dyn Gateway, &CommandArgs) -> Result<Payload, CatastoError>;

/// What dispatching a command does.
#[derive(Clone, Copy)]
pub enum CommandAction {
    /// Build a profile from the arguments and open the session
    Connect,
    /// Release the session
    Disconnect,
    /// End the main loop
    Exit,
    /// Run a handler against the live session
    Run(Handler),
}

impl std::fmt::Debug for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => f.write_str("Connect"),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Exit => f.write_str("Exit"),
            Self::Run(_) => f.write_str("Run"),
        }
    }
}

/// A menu entry.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    /// Stable identifier
    pub id: &'static str,
    /// Menu label
    pub label: &'static str,
    /// Number typed to select it
    pub key: u32,
    /// When it is offered and allowed
    pub availability: Availability,
    /// Inputs prompted before dispatch
    pub inputs: &'static [InputSpec],
    /// What it does
    pub action: CommandAction,
}

impl CommandDescriptor {
    /// Whether dispatch needs a connected session.
    pub fn requires_connection(&self) -> bool {
        self.availability.requires_connection()
    }
}

/// The fixed set of commands, in menu order.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: Vec<CommandDescriptor>,
}

impl CommandRegistry {
    /// Registry from an explicit command list.
    pub fn new(commands: Vec<CommandDescriptor>) -> Self {
        Self { commands }
    }

    /// The registry used by the client.
    pub fn standard() -> Self {
        Self::new(standard_commands())
    }

    /// Look up a command by identifier.
    pub fn get(&self, id: &str) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|c| c.id == id)
    }

    /// All commands, in menu order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ========== Inputs ==========

const CONNECT_INPUTS: &[InputSpec] = &[
    InputSpec::with_default("host", "Host", InputKind::Text, "localhost"),
    InputSpec::with_default("port", "Porta", InputKind::Integer, "5432"),
    InputSpec::with_default("database", "Database", InputKind::Text, "catasto_storico"),
    InputSpec::with_default("schema", "Schema", InputKind::Text, "catasto"),
    InputSpec::with_default("user", "Utente", InputKind::Text, "postgres"),
    InputSpec::new("password", "Password", InputKind::Secret),
];

const COMUNE_FILTER: &[InputSpec] =
    &[InputSpec::new("comune", "Comune (anche parziale)", InputKind::Text)];

const COMUNE: &[InputSpec] = &[InputSpec::new("comune", "Comune", InputKind::Text)];

const SEARCH_TERM: &[InputSpec] = &[InputSpec::new("nome", "Nome da cercare", InputKind::Text)];

const POSSESSORE_ID: &[InputSpec] =
    &[InputSpec::new("possessore_id", "ID del possessore", InputKind::Integer)];

const PARTITA_ID: &[InputSpec] =
    &[InputSpec::new("partita_id", "ID della partita", InputKind::Integer)];

const IMMOBILE_ID: &[InputSpec] =
    &[InputSpec::new("immobile_id", "ID dell'immobile", InputKind::Integer)];

const IMMOBILI_FILTER: &[InputSpec] = &[
    InputSpec::new("comune", "Comune [vuoto per tutti]", InputKind::OptionalText),
    InputSpec::new("natura", "Natura immobile [vuoto per tutti]", InputKind::OptionalText),
];

const NEW_POSSESSORE: &[InputSpec] = &[
    InputSpec::new("comune", "Comune", InputKind::Text),
    InputSpec::new("cognome_nome", "Cognome e nome (es. Rossi Mario)", InputKind::Text),
    InputSpec::new("paternita", "Paternità (es. fu Giuseppe)", InputKind::OptionalText),
    InputSpec::with_default("attivo", "Attivo? (s/n)", InputKind::Confirm, "s"),
];

const NEW_PARTITA: &[InputSpec] = &[
    InputSpec::new("comune", "Comune", InputKind::Text),
    InputSpec::new("numero_partita", "Numero partita", InputKind::Integer),
    InputSpec::with_default("tipo", "Tipo (principale/secondaria)", InputKind::Text, "principale"),
    InputSpec::new("data_impianto", "Data impianto (AAAA-MM-GG) [oggi]", InputKind::Date),
    InputSpec::new("possessori", "ID dei possessori (separati da virgola)", InputKind::IntegerList),
];

const UPDATE_POSSESSORE: &[InputSpec] = &[
    InputSpec::new("possessore_id", "ID del possessore", InputKind::Integer),
    InputSpec::new("stato", "Nuovo stato (attivo/non attivo)", InputKind::Text),
];

const REPAIR_CONFIRM: &[InputSpec] = &[InputSpec::new(
    "conferma",
    "Confermi la riparazione automatica dei problemi? (s/n)",
    InputKind::Confirm,
)];

const BACKUP_INPUTS: &[InputSpec] = &[InputSpec::with_default(
    "directory",
    "Directory di destinazione",
    InputKind::Text,
    "/tmp",
)];

const NEW_CONSULTAZIONE: &[InputSpec] = &[
    InputSpec::new("data", "Data (AAAA-MM-GG) [oggi]", InputKind::Date),
    InputSpec::new("richiedente", "Richiedente", InputKind::Text),
    InputSpec::new("documento_identita", "Documento d'identità", InputKind::OptionalText),
    InputSpec::new("motivazione", "Motivazione", InputKind::Text),
    InputSpec::new("materiale_consultato", "Materiale consultato", InputKind::Text),
    InputSpec::new("funzionario", "Funzionario autorizzante", InputKind::Text),
];

const CONSULTAZIONI_FILTER: &[InputSpec] = &[
    InputSpec::new("data_inizio", "Dal (AAAA-MM-GG) [vuoto per nessun limite]", InputKind::Date),
    InputSpec::new("data_fine", "Al (AAAA-MM-GG) [vuoto per nessun limite]", InputKind::Date),
    InputSpec::new("richiedente", "Richiedente [vuoto per tutti]", InputKind::OptionalText),
    InputSpec::new("funzionario", "Funzionario [vuoto per tutti]", InputKind::OptionalText),
];

/// Prefix of every backup file written by the server.
pub const BACKUP_PREFIX: &str = "catasto_backup";

/// Notice fragments that mean the integrity check found something.
pub const PROBLEM_MARKERS: &[&str] = &["Problemi", "Problema:", "WARNING:", "ERRORE:"];

fn entry(
    id: &'static str,
    label: &'static str,
    key: u32,
    inputs: &'static [InputSpec],
    handler: Handler,
) -> CommandDescriptor {
    CommandDescriptor {
        id,
        label,
        key,
        availability: Availability::WhenConnected,
        inputs,
        action: CommandAction::Run(handler),
    }
}

fn standard_commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor {
            id: "connect",
            label: "Connetti al database",
            key: 1,
            availability: Availability::WhenDisconnected,
            inputs: CONNECT_INPUTS,
            action: CommandAction::Connect,
        },
        entry("listMunicipalities", "Visualizza comuni", 1, &[], list_municipalities),
        entry("listPartite", "Visualizza partite", 2, &[], list_partite),
        entry("searchPartite", "Cerca partite per comune", 3, COMUNE_FILTER, search_partite),
        entry("listPossessori", "Visualizza possessori", 4, &[], list_possessori),
        entry("searchPossessori", "Cerca possessori", 5, SEARCH_TERM, search_possessori),
        entry(
            "listPossessoriByComune",
            "Possessori attivi di un comune",
            6,
            COMUNE,
            list_possessori_by_comune,
        ),
        entry(
            "listPartiteByPossessore",
            "Partite di un possessore",
            7,
            POSSESSORE_ID,
            list_partite_by_possessore,
        ),
        entry("listImmobili", "Visualizza immobili", 8, &[], list_immobili),
        entry("searchImmobili", "Cerca immobili", 9, IMMOBILI_FILTER, search_immobili),
        entry(
            "nextPartitaNumber",
            "Prossimo numero di partita libero",
            10,
            COMUNE,
            next_partita_number,
        ),
        entry(
            "generateCertificate",
            "Genera certificato di proprietà",
            11,
            PARTITA_ID,
            generate_certificate,
        ),
        entry(
            "generateGenealogyReport",
            "Genera report genealogico di una proprietà",
            12,
            PARTITA_ID,
            generate_genealogy_report,
        ),
        entry(
            "generateOwnerReport",
            "Genera report storico di un possessore",
            13,
            POSSESSORE_ID,
            generate_owner_report,
        ),
        entry("insertPossessore", "Inserisci nuovo possessore", 14, NEW_POSSESSORE, insert_possessore),
        entry("insertPartita", "Inserisci nuova partita", 15, NEW_PARTITA, insert_partita),
        entry(
            "updatePossessore",
            "Aggiorna stato di un possessore",
            16,
            UPDATE_POSSESSORE,
            update_possessore,
        ),
        entry("verifyIntegrity", "Verifica integrità del database", 17, &[], verify_integrity),
        entry("repairIntegrity", "Ripara problemi del database", 18, REPAIR_CONFIRM, repair_integrity),
        entry("backupDatabase", "Crea backup dei dati", 19, BACKUP_INPUTS, backup_database),
        entry("showPartita", "Dettagli di una partita", 20, PARTITA_ID, show_partita),
        entry("showPossessore", "Dettagli di un possessore", 21, POSSESSORE_ID, show_possessore),
        entry("showImmobile", "Dettagli di un immobile", 22, IMMOBILE_ID, show_immobile),
        entry(
            "listImmobiliByPossessore",
            "Immobili di un possessore",
            23,
            POSSESSORE_ID,
            list_immobili_by_possessore,
        ),
        entry("exportPartitaJson", "Esporta partita in JSON", 24, PARTITA_ID, export_partita_json),
        entry(
            "registerConsultazione",
            "Registra una consultazione",
            25,
            NEW_CONSULTAZIONE,
            register_consultazione,
        ),
        entry(
            "searchConsultazioni",
            "Cerca consultazioni",
            26,
            CONSULTAZIONI_FILTER,
            search_consultazioni,
        ),
        CommandDescriptor {
            id: "disconnect",
            label: "Disconnetti",
            key: 27,
            availability: Availability::WhenConnected,
            inputs: &[],
            action: CommandAction::Disconnect,
        },
        CommandDescriptor {
            id: "exit",
            label: "Esci",
            key: 0,
            availability: Availability::Always,
            inputs: &[],
            action: CommandAction::Exit,
        },
    ]
}

// ========== Handlers ==========

fn list_municipalities(db: &mut dyn Gateway, _args: &CommandArgs) -> Result<Payload, CatastoError> {
    Ok(Payload::Table(db.run_query(QueryId::Municipalities, &[])?))
}

fn list_partite(db: &mut dyn Gateway, _args: &CommandArgs) -> Result<Payload, CatastoError> {
    Ok(Payload::Table(db.run_query(QueryId::Partite, &[])?))
}

fn search_partite(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let pattern = format!("%{}%", args.text("comune")?);
    Ok(Payload::Table(db.run_query(QueryId::PartiteByComune, &[Value::Text(pattern)])?))
}

fn list_possessori(db: &mut dyn Gateway, _args: &CommandArgs) -> Result<Payload, CatastoError> {
    Ok(Payload::Table(db.run_query(QueryId::Possessori, &[])?))
}

fn search_possessori(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let term = Value::text(args.text("nome")?);
    Ok(Payload::Table(db.run_query(QueryId::SearchPossessori, &[term])?))
}

fn list_possessori_by_comune(
    db: &mut dyn Gateway,
    args: &CommandArgs,
) -> Result<Payload, CatastoError> {
    let comune = Value::text(args.text("comune")?);
    Ok(Payload::Table(db.run_query(QueryId::PossessoriByComune, &[comune])?))
}

fn list_partite_by_possessore(
    db: &mut dyn Gateway,
    args: &CommandArgs,
) -> Result<Payload, CatastoError> {
    let id = Value::from(args.id("possessore_id")?);
    Ok(Payload::Table(db.run_query(QueryId::PartiteByPossessore, &[id])?))
}

fn list_immobili(db: &mut dyn Gateway, _args: &CommandArgs) -> Result<Payload, CatastoError> {
    Ok(Payload::Table(db.run_query(QueryId::Immobili, &[])?))
}

fn search_immobili(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let params = [
        Value::optional_text(args.optional_text("comune")),
        Value::optional_text(args.optional_text("natura")),
    ];
    Ok(Payload::Table(db.run_query(QueryId::SearchImmobili, &params)?))
}

fn next_partita_number(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let comune = args.text("comune")?.to_string();
    let table = db.run_query(QueryId::NextPartitaNumber, &[Value::text(comune.as_str())])?;
    let next = table.scalar().and_then(Value::as_int).unwrap_or(1);
    Ok(Payload::message(format!("Prossimo numero di partita libero a {comune}: {next}")))
}

fn document_or_empty(title: &str, result: ProcedureResult) -> Payload {
    match result.text() {
        Some(body) => Payload::document(title, body),
        None => Payload::message(format!("{title}: nessun documento generato")),
    }
}

fn generate_certificate(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = Value::from(args.id("partita_id")?);
    let result = db.run_procedure(ProcedureId::PropertyCertificate, &[id])?;
    Ok(document_or_empty("CERTIFICATO DI PROPRIETÀ", result))
}

fn generate_genealogy_report(
    db: &mut dyn Gateway,
    args: &CommandArgs,
) -> Result<Payload, CatastoError> {
    let id = Value::from(args.id("partita_id")?);
    let result = db.run_procedure(ProcedureId::GenealogyReport, &[id])?;
    Ok(document_or_empty("REPORT GENEALOGICO", result))
}

fn generate_owner_report(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = Value::from(args.id("possessore_id")?);
    let result = db.run_procedure(ProcedureId::OwnerReport, &[id])?;
    Ok(document_or_empty("REPORT POSSESSORE", result))
}

/// Full name as stored: surname and name followed by the patronymic.
pub fn nome_completo(cognome_nome: &str, paternita: Option<&str>) -> String {
    format!("{} {}", cognome_nome.trim(), paternita.unwrap_or("").trim()).trim().to_string()
}

fn insert_possessore(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let comune = args.text("comune")?;
    let cognome_nome = args.text("cognome_nome")?;
    let paternita = args.optional_text("paternita");
    let full_name = nome_completo(cognome_nome, paternita);
    let attivo = args.confirmed("attivo");

    db.run_procedure(
        ProcedureId::InsertPossessore,
        &[
            Value::text(comune),
            Value::text(cognome_nome),
            Value::text(paternita.unwrap_or("")),
            Value::text(full_name.as_str()),
            Value::Bool(attivo),
        ],
    )?;
    Ok(Payload::message(format!(
        "Possessore {full_name} inserito con successo nel comune di {comune}"
    )))
}

/// Accepted partita types.
pub const PARTITA_TYPES: &[&str] = &["principale", "secondaria"];

fn partita_type(args: &CommandArgs) -> Result<String, CatastoError> {
    let tipo = args.text("tipo")?.to_lowercase();
    if !PARTITA_TYPES.contains(&tipo.as_str()) {
        return Err(CatastoError::input_format(
            "tipo",
            format!("'{tipo}' deve essere uno tra {}", PARTITA_TYPES.join(", ")),
        ));
    }
    Ok(tipo)
}

fn insert_partita(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let comune = args.text("comune")?;
    let numero = args.id("numero_partita")?;
    let tipo = partita_type(args)?;
    let data: NaiveDate =
        args.optional_date("data_impianto")?.unwrap_or_else(|| Local::now().date_naive());
    let possessori = args.integer_list("possessori")?;

    db.run_procedure(
        ProcedureId::InsertPartita,
        &[
            Value::text(comune),
            Value::from(numero),
            Value::Text(tipo),
            Value::Date(data),
            Value::IntArray(possessori),
        ],
    )?;
    Ok(Payload::message(format!(
        "Partita {numero} inserita con successo nel comune di {comune}"
    )))
}

fn possessore_state(args: &CommandArgs) -> Result<bool, CatastoError> {
    let raw = args.text("stato")?.to_lowercase();
    match raw.as_str() {
        "attivo" | "s" | "si" | "sì" | "y" | "yes" => Ok(true),
        "non attivo" | "inattivo" | "n" | "no" => Ok(false),
        _ => Err(CatastoError::input_format("stato", format!("'{raw}' deve essere attivo o non attivo"))),
    }
}

fn update_possessore(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = args.id("possessore_id")?;
    let attivo = possessore_state(args)?;
    let result =
        db.run_procedure(ProcedureId::UpdatePossessore, &[Value::Bool(attivo), Value::from(id)])?;

    let affected = result.value.as_ref().and_then(Value::as_int).unwrap_or(0);
    if affected == 0 {
        return Ok(Payload::message(format!(
            "Attenzione: nessun possessore trovato con ID {id}, nessuna modifica effettuata"
        )));
    }
    let state = if attivo { "attivo" } else { "non attivo" };
    Ok(Payload::message(format!("Possessore {id} aggiornato. Nuovo stato: {state}")))
}

/// Whether a notice reports an integrity problem.
pub fn is_problem_notice(notice: &str) -> bool {
    PROBLEM_MARKERS.iter().any(|marker| notice.contains(marker))
}

fn notice_body(header: String, notices: &[String]) -> String {
    let mut body = header;
    if notices.is_empty() {
        body.push_str("\nNessun messaggio dal database.");
    } else {
        body.push_str("\n\nMessaggi dal database:");
        for notice in notices {
            body.push_str("\n  ");
            body.push_str(notice);
        }
    }
    body
}

fn verify_integrity(db: &mut dyn Gateway, _args: &CommandArgs) -> Result<Payload, CatastoError> {
    let result = db.run_procedure(ProcedureId::IntegrityCheck, &[])?;
    let flagged = result.value.as_ref().and_then(Value::as_bool).unwrap_or(false);
    let problems = flagged || result.notices.iter().any(|n| is_problem_notice(n));

    let header = if problems {
        "Problemi trovati: Sì".to_string()
    } else {
        "Problemi trovati: No".to_string()
    };
    Ok(Payload::document("VERIFICA INTEGRITÀ DATABASE", notice_body(header, &result.notices)))
}

fn repair_integrity(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    if !args.confirmed("conferma") {
        return Ok(Payload::message("Riparazione annullata."));
    }
    let result = db.run_procedure(ProcedureId::IntegrityRepair, &[Value::Bool(true)])?;
    Ok(Payload::document(
        "RIPARAZIONE DATABASE",
        notice_body("Procedura di riparazione completata.".to_string(), &result.notices),
    ))
}

fn backup_database(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let directory = args.text("directory")?;
    let result = db.run_procedure(
        ProcedureId::LogicalBackup,
        &[Value::text(directory), Value::text(BACKUP_PREFIX)],
    )?;
    Ok(Payload::document(
        "BACKUP DATABASE",
        notice_body(format!("Procedura di backup completata in {directory}."), &result.notices),
    ))
}

/// How a single-record lookup is laid out as a document.
struct DetailLayout {
    title: &'static str,
    /// Message prefix when no record has the requested id
    missing: &'static str,
    /// `(column, label)` pairs printed as `label: value`, NULLs skipped
    fields: &'static [(&'static str, &'static str)],
    /// Column holding a newline-separated list, its heading, and the text for no items
    list: (&'static str, &'static str, &'static str),
}

const PARTITA_LAYOUT: DetailLayout = DetailLayout {
    title: "DETTAGLI PARTITA",
    missing: "Nessuna partita trovata con ID",
    fields: &[
        ("id", "ID"),
        ("comune_nome", "Comune"),
        ("numero_partita", "Numero"),
        ("tipo", "Tipo"),
        ("stato", "Stato"),
        ("data_impianto", "Data impianto"),
        ("data_chiusura", "Data chiusura"),
        ("possessori", "Possessori"),
    ],
    list: ("immobili", "IMMOBILI", "Nessun immobile associato."),
};

const POSSESSORE_LAYOUT: DetailLayout = DetailLayout {
    title: "DETTAGLI POSSESSORE",
    missing: "Nessun possessore trovato con ID",
    fields: &[
        ("id", "ID"),
        ("nome_completo", "Nome completo"),
        ("cognome_nome", "Cognome e nome"),
        ("paternita", "Paternità"),
        ("comune_nome", "Comune"),
        ("stato", "Stato"),
    ],
    list: ("partite", "PARTITE", "Nessuna partita associata."),
};

const IMMOBILE_LAYOUT: DetailLayout = DetailLayout {
    title: "DETTAGLI IMMOBILE",
    missing: "Nessun immobile trovato con ID",
    fields: &[
        ("id", "ID"),
        ("natura", "Natura"),
        ("localita", "Località"),
        ("classificazione", "Classificazione"),
        ("numero_piani", "Numero piani"),
        ("numero_vani", "Numero vani"),
        ("consistenza", "Consistenza"),
        ("numero_partita", "Partita"),
        ("comune_nome", "Comune"),
        ("partita_tipo", "Tipo partita"),
    ],
    list: ("possessori", "POSSESSORI", "Nessun possessore associato."),
};

fn detail_document(layout: &DetailLayout, id: i32, table: &Table) -> Payload {
    let Some(row) = table.rows.first() else {
        return Payload::message(format!("{} {id}", layout.missing));
    };
    let cell = |column: &str| {
        table
            .columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| row.get(i))
            .filter(|v| !v.is_null())
    };

    let mut lines = Vec::new();
    for &(column, label) in layout.fields {
        if let Some(value) = cell(column) {
            lines.push(format!("{label}: {value}"));
        }
    }

    let (column, heading, empty) = layout.list;
    lines.push(String::new());
    lines.push(format!("{heading}:"));
    match cell(column).and_then(Value::as_text) {
        Some(items) => lines.extend(
            items.lines().enumerate().map(|(i, item)| format!("{}. {item}", i + 1)),
        ),
        None => lines.push(empty.to_string()),
    }

    Payload::document(format!("{} #{id}", layout.title), lines.join("\n"))
}

fn show_partita(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = args.id("partita_id")?;
    let table = db.run_query(QueryId::PartitaDetails, &[Value::from(id)])?;
    Ok(detail_document(&PARTITA_LAYOUT, id, &table))
}

fn show_possessore(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = args.id("possessore_id")?;
    let table = db.run_query(QueryId::PossessoreDetails, &[Value::from(id)])?;
    Ok(detail_document(&POSSESSORE_LAYOUT, id, &table))
}

fn show_immobile(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = args.id("immobile_id")?;
    let table = db.run_query(QueryId::ImmobileDetails, &[Value::from(id)])?;
    Ok(detail_document(&IMMOBILE_LAYOUT, id, &table))
}

fn list_immobili_by_possessore(
    db: &mut dyn Gateway,
    args: &CommandArgs,
) -> Result<Payload, CatastoError> {
    let id = Value::from(args.id("possessore_id")?);
    Ok(Payload::Table(db.run_query(QueryId::ImmobiliByPossessore, &[id])?))
}

const EXPORT_TITLE: &str = "ESPORTAZIONE JSON PARTITA";

fn export_partita_json(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let id = Value::from(args.id("partita_id")?);
    let result = db.run_procedure(ProcedureId::ExportPartitaJson, &[id])?;
    let Some(raw) = result.text() else {
        return Ok(Payload::message(format!("{EXPORT_TITLE}: nessun documento generato")));
    };

    let body = serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|json| serde_json::to_string_pretty(&json))
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Exported partita is not valid JSON, showing it as received");
            raw.to_string()
        });
    Ok(Payload::document(EXPORT_TITLE, body))
}

fn optional_date_param(args: &CommandArgs, name: &str) -> Result<Value, CatastoError> {
    Ok(args.optional_date(name)?.map_or(Value::Null, Value::Date))
}

fn register_consultazione(
    db: &mut dyn Gateway,
    args: &CommandArgs,
) -> Result<Payload, CatastoError> {
    let data = args.optional_date("data")?.unwrap_or_else(|| Local::now().date_naive());
    let richiedente = args.text("richiedente")?;
    let documento = Value::optional_text(args.optional_text("documento_identita"));
    let motivazione = args.text("motivazione")?;
    let materiale = args.text("materiale_consultato")?;
    let funzionario = args.text("funzionario")?;

    db.run_procedure(
        ProcedureId::RegisterConsultazione,
        &[
            Value::Date(data),
            Value::text(richiedente),
            documento,
            Value::text(motivazione),
            Value::text(materiale),
            Value::text(funzionario),
        ],
    )?;
    Ok(Payload::message(format!("Consultazione del {data} registrata per {richiedente}")))
}

fn search_consultazioni(db: &mut dyn Gateway, args: &CommandArgs) -> Result<Payload, CatastoError> {
    let params = [
        optional_date_param(args, "data_inizio")?,
        optional_date_param(args, "data_fine")?,
        Value::optional_text(args.optional_text("richiedente")),
        Value::optional_text(args.optional_text("funzionario")),
    ];
    Ok(Payload::Table(db.run_query(QueryId::SearchConsultazioni, &params)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Table;
    use crate::services::fake::{FakeCollaborator, FakeHandle};
    use crate::services::sql::{placeholder_count, procedure_sql, query_sql};
    use crate::services::BoundGateway;
    use std::collections::HashSet;

    fn run(
        fake: &mut FakeCollaborator,
        id: &str,
        args: CommandArgs,
    ) -> Result<Payload, CatastoError> {
        let registry = CommandRegistry::standard();
        let command = registry.get(id).unwrap();
        let CommandAction::Run(handler) = command.action else {
            panic!("{id} is not a handler command");
        };
        let args = args.with_defaults(command.inputs);
        let mut handle = FakeHandle { id: 1 };
        let mut gateway = BoundGateway::new(fake, &mut handle);
        handler(&mut gateway, &args)
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let registry = CommandRegistry::standard();
        let ids: HashSet<_> = registry.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), registry.len());
    }

    #[test]
    fn test_menu_keys_are_unique_per_menu() {
        let registry = CommandRegistry::standard();
        for connected in [false, true] {
            let keys: Vec<_> = registry
                .iter()
                .filter(|c| c.availability.is_listed(connected))
                .map(|c| c.key)
                .collect();
            let unique: HashSet<_> = keys.iter().collect();
            assert_eq!(unique.len(), keys.len());
        }
    }

    #[test]
    fn test_only_connect_and_exit_skip_connection() {
        let registry = CommandRegistry::standard();
        let open: Vec<_> =
            registry.iter().filter(|c| !c.requires_connection()).map(|c| c.id).collect();
        assert_eq!(open, vec!["connect", "exit"]);
    }

    #[test]
    fn test_every_query_binds_what_its_sql_expects() {
        let mut fake = FakeCollaborator::new();
        let cases = [
            ("listMunicipalities", CommandArgs::new()),
            ("listPartite", CommandArgs::new()),
            ("searchPartite", CommandArgs::new().with("comune", "carcare")),
            ("listPossessori", CommandArgs::new()),
            ("searchPossessori", CommandArgs::new().with("nome", "Fossati")),
            ("listPossessoriByComune", CommandArgs::new().with("comune", "Carcare")),
            ("listPartiteByPossessore", CommandArgs::new().with("possessore_id", "3")),
            ("listImmobili", CommandArgs::new()),
            ("searchImmobili", CommandArgs::new()),
            ("nextPartitaNumber", CommandArgs::new().with("comune", "Carcare")),
            ("showPartita", CommandArgs::new().with("partita_id", "1")),
            ("showPossessore", CommandArgs::new().with("possessore_id", "1")),
            ("showImmobile", CommandArgs::new().with("immobile_id", "1")),
            ("listImmobiliByPossessore", CommandArgs::new().with("possessore_id", "1")),
            ("searchConsultazioni", CommandArgs::new()),
        ];
        for (id, args) in cases {
            run(&mut fake, id, args).unwrap();
        }
        for (query, params) in &fake.queries {
            assert_eq!(params.len(), placeholder_count(query_sql(*query)), "{query:?}");
        }
    }

    #[test]
    fn test_every_procedure_binds_what_its_sql_expects() {
        let mut fake = FakeCollaborator::new();
        let cases = [
            ("generateCertificate", CommandArgs::new().with("partita_id", "1")),
            ("generateGenealogyReport", CommandArgs::new().with("partita_id", "1")),
            ("generateOwnerReport", CommandArgs::new().with("possessore_id", "1")),
            (
                "insertPossessore",
                CommandArgs::new()
                    .with("comune", "Carcare")
                    .with("cognome_nome", "Fossati Angelo")
                    .with("paternita", "fu Roberto"),
            ),
            (
                "insertPartita",
                CommandArgs::new()
                    .with("comune", "Carcare")
                    .with("numero_partita", "221")
                    .with("possessori", "1,2"),
            ),
            (
                "updatePossessore",
                CommandArgs::new().with("possessore_id", "1").with("stato", "attivo"),
            ),
            ("verifyIntegrity", CommandArgs::new()),
            ("repairIntegrity", CommandArgs::new().with("conferma", "s")),
            ("backupDatabase", CommandArgs::new()),
            ("exportPartitaJson", CommandArgs::new().with("partita_id", "1")),
            (
                "registerConsultazione",
                CommandArgs::new()
                    .with("richiedente", "Rossi Marco")
                    .with("motivazione", "Ricerca storica")
                    .with("materiale_consultato", "Partite di Carcare")
                    .with("funzionario", "Bianchi Laura"),
            ),
        ];
        for (id, args) in cases {
            run(&mut fake, id, args).unwrap();
        }
        assert_eq!(fake.procedure_calls.len(), 11);
        for (procedure, params) in &fake.procedure_calls {
            assert_eq!(params.len(), placeholder_count(procedure_sql(*procedure).sql), "{procedure:?}");
        }
    }

    #[test]
    fn test_search_partite_uses_substring_pattern() {
        let mut fake = FakeCollaborator::new();
        run(&mut fake, "searchPartite", CommandArgs::new().with("comune", "carc")).unwrap();
        assert_eq!(fake.queries[0].1, vec![Value::text("%carc%")]);
    }

    #[test]
    fn test_search_immobili_blank_filters_are_null() {
        let mut fake = FakeCollaborator::new();
        run(&mut fake, "searchImmobili", CommandArgs::new().with("natura", "Casa")).unwrap();
        assert_eq!(fake.queries[0].1, vec![Value::Null, Value::text("Casa")]);
    }

    #[test]
    fn test_certificate_returns_document() {
        let mut fake = FakeCollaborator::new().with_procedure(
            ProcedureId::PropertyCertificate,
            ProcedureResult::with_value(Value::text("CERTIFICATO N. 1")),
        );
        let payload =
            run(&mut fake, "generateCertificate", CommandArgs::new().with("partita_id", "1"))
                .unwrap();
        assert_eq!(payload, Payload::document("CERTIFICATO DI PROPRIETÀ", "CERTIFICATO N. 1"));
        assert_eq!(fake.procedure_calls[0].1, vec![Value::Int(1)]);
    }

    #[test]
    fn test_null_report_is_not_an_error() {
        let mut fake = FakeCollaborator::new();
        let payload =
            run(&mut fake, "generateOwnerReport", CommandArgs::new().with("possessore_id", "9"))
                .unwrap();
        match payload {
            Payload::Message(text) => assert!(text.contains("nessun documento generato")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_bad_partita_id_makes_no_call() {
        let mut fake = FakeCollaborator::new();
        let err = run(&mut fake, "generateCertificate", CommandArgs::new().with("partita_id", "abc"))
            .unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(fake.total_calls(), 0);
    }

    #[test]
    fn test_insert_possessore_builds_full_name() {
        let mut fake = FakeCollaborator::new();
        let args = CommandArgs::new()
            .with("comune", "Carcare")
            .with("cognome_nome", "Fossati Angelo")
            .with("paternita", "fu Roberto");
        run(&mut fake, "insertPossessore", args).unwrap();
        let params = &fake.procedure_calls[0].1;
        assert_eq!(params[3], Value::text("Fossati Angelo fu Roberto"));
        assert_eq!(params[4], Value::Bool(true));
    }

    #[test]
    fn test_nome_completo_without_paternita() {
        assert_eq!(nome_completo(" Rossi Mario ", None), "Rossi Mario");
        assert_eq!(nome_completo("Rossi Mario", Some("fu Luigi")), "Rossi Mario fu Luigi");
    }

    #[test]
    fn test_insert_partita_defaults() {
        let mut fake = FakeCollaborator::new();
        let args = CommandArgs::new()
            .with("comune", "Carcare")
            .with("numero_partita", "221")
            .with("possessori", "4, 7");
        run(&mut fake, "insertPartita", args).unwrap();
        let params = &fake.procedure_calls[0].1;
        assert_eq!(params[2], Value::text("principale"));
        assert_eq!(params[3], Value::Date(Local::now().date_naive()));
        assert_eq!(params[4], Value::IntArray(vec![4, 7]));
    }

    #[test]
    fn test_insert_partita_rejects_unknown_type() {
        let mut fake = FakeCollaborator::new();
        let args = CommandArgs::new()
            .with("comune", "Carcare")
            .with("numero_partita", "221")
            .with("tipo", "terziaria")
            .with("possessori", "4");
        assert!(run(&mut fake, "insertPartita", args).unwrap_err().is_input_error());
        assert_eq!(fake.command_calls(), 0);
    }

    #[test]
    fn test_update_possessore_zero_rows_is_a_warning() {
        let mut fake = FakeCollaborator::new().with_procedure(
            ProcedureId::UpdatePossessore,
            ProcedureResult::with_value(Value::Int(0)),
        );
        let args = CommandArgs::new().with("possessore_id", "99").with("stato", "non attivo");
        match run(&mut fake, "updatePossessore", args).unwrap() {
            Payload::Message(text) => assert!(text.starts_with("Attenzione")),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(fake.procedure_calls[0].1, vec![Value::Bool(false), Value::Int(99)]);
    }

    #[test]
    fn test_verify_integrity_reads_notices() {
        let result = ProcedureResult {
            value: Some(Value::Bool(false)),
            notices: vec!["Problema: 2 partite senza possessori".to_string()],
        };
        let mut fake =
            FakeCollaborator::new().with_procedure(ProcedureId::IntegrityCheck, result);
        match run(&mut fake, "verifyIntegrity", CommandArgs::new()).unwrap() {
            Payload::Document { body, .. } => {
                assert!(body.starts_with("Problemi trovati: Sì"));
                assert!(body.contains("2 partite senza possessori"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_verify_integrity_clean() {
        let mut fake = FakeCollaborator::new().with_procedure(
            ProcedureId::IntegrityCheck,
            ProcedureResult::with_value(Value::Bool(false)),
        );
        match run(&mut fake, "verifyIntegrity", CommandArgs::new()).unwrap() {
            Payload::Document { body, .. } => assert!(body.starts_with("Problemi trovati: No")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_problem_markers() {
        assert!(is_problem_notice("WARNING: orphan immobile 12"));
        assert!(is_problem_notice("Problemi di integrità rilevati"));
        assert!(!is_problem_notice("Verifica completata"));
    }

    #[test]
    fn test_repair_requires_confirmation() {
        let mut fake = FakeCollaborator::new();
        let payload =
            run(&mut fake, "repairIntegrity", CommandArgs::new().with("conferma", "n")).unwrap();
        assert_eq!(payload, Payload::message("Riparazione annullata."));
        assert_eq!(fake.total_calls(), 0);
    }

    #[test]
    fn test_backup_defaults_to_tmp() {
        let mut fake = FakeCollaborator::new();
        run(&mut fake, "backupDatabase", CommandArgs::new().with("directory", "")).unwrap();
        assert_eq!(
            fake.procedure_calls[0].1,
            vec![Value::text("/tmp"), Value::text(BACKUP_PREFIX)]
        );
    }

    #[test]
    fn test_next_partita_number_message() {
        let table = Table::new(["prossimo_numero"]).with_row(vec![Value::Int(222)]);
        let mut fake = FakeCollaborator::new().with_table(QueryId::NextPartitaNumber, table);
        let payload =
            run(&mut fake, "nextPartitaNumber", CommandArgs::new().with("comune", "Carcare"))
                .unwrap();
        assert_eq!(
            payload,
            Payload::message("Prossimo numero di partita libero a Carcare: 222")
        );
    }

    #[test]
    fn test_show_partita_lists_immobili() {
        let table = Table::new(["id", "comune_nome", "numero_partita", "data_chiusura", "immobili"])
            .with_row(vec![
                Value::Int(12),
                Value::text("Carcare"),
                Value::Int(221),
                Value::Null,
                Value::text("Casa in Via Roma (civile)\nTerreno in Vispa"),
            ]);
        let mut fake = FakeCollaborator::new().with_table(QueryId::PartitaDetails, table);
        let payload =
            run(&mut fake, "showPartita", CommandArgs::new().with("partita_id", "12")).unwrap();
        assert_eq!(
            payload,
            Payload::document(
                "DETTAGLI PARTITA #12",
                "ID: 12\nComune: Carcare\nNumero: 221\n\nIMMOBILI:\n\
                 1. Casa in Via Roma (civile)\n2. Terreno in Vispa"
            )
        );
        assert_eq!(fake.queries[0].1, vec![Value::Int(12)]);
    }

    #[test]
    fn test_show_possessore_without_partite() {
        let table = Table::new(["id", "nome_completo", "stato", "partite"]).with_row(vec![
            Value::Int(3),
            Value::text("Fossati Angelo fu Roberto"),
            Value::text("attivo"),
            Value::Null,
        ]);
        let mut fake = FakeCollaborator::new().with_table(QueryId::PossessoreDetails, table);
        match run(&mut fake, "showPossessore", CommandArgs::new().with("possessore_id", "3")).unwrap() {
            Payload::Document { title, body } => {
                assert_eq!(title, "DETTAGLI POSSESSORE #3");
                assert!(body.contains("Nome completo: Fossati Angelo fu Roberto"));
                assert!(body.ends_with("PARTITE:\nNessuna partita associata."));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_show_missing_immobile() {
        let mut fake = FakeCollaborator::new();
        let payload =
            run(&mut fake, "showImmobile", CommandArgs::new().with("immobile_id", "404")).unwrap();
        assert_eq!(payload, Payload::message("Nessun immobile trovato con ID 404"));
        assert_eq!(fake.command_calls(), 1);
    }

    #[test]
    fn test_export_partita_json_is_indented() {
        let mut fake = FakeCollaborator::new().with_procedure(
            ProcedureId::ExportPartitaJson,
            ProcedureResult::with_value(Value::text(r#"{"partita":{"numero_partita":221}}"#)),
        );
        let payload =
            run(&mut fake, "exportPartitaJson", CommandArgs::new().with("partita_id", "7")).unwrap();
        assert_eq!(
            payload,
            Payload::document(EXPORT_TITLE, "{\n  \"partita\": {\n    \"numero_partita\": 221\n  }\n}")
        );
    }

    #[test]
    fn test_export_partita_null_is_not_an_error() {
        let mut fake = FakeCollaborator::new();
        let payload =
            run(&mut fake, "exportPartitaJson", CommandArgs::new().with("partita_id", "7")).unwrap();
        assert_eq!(
            payload,
            Payload::message("ESPORTAZIONE JSON PARTITA: nessun documento generato")
        );
    }

    #[test]
    fn test_register_consultazione_params() {
        let mut fake = FakeCollaborator::new();
        let args = CommandArgs::new()
            .with("data", "1998-05-12")
            .with("richiedente", "Rossi Marco")
            .with("motivazione", "Ricerca storica")
            .with("materiale_consultato", "Partite di Carcare")
            .with("funzionario", "Bianchi Laura");
        let payload = run(&mut fake, "registerConsultazione", args).unwrap();
        assert_eq!(
            payload,
            Payload::message("Consultazione del 1998-05-12 registrata per Rossi Marco")
        );
        let params = &fake.procedure_calls[0].1;
        assert_eq!(params[0], Value::Date(NaiveDate::from_ymd_opt(1998, 5, 12).unwrap()));
        assert_eq!(params[2], Value::Null);
    }

    #[test]
    fn test_search_consultazioni_filters() {
        let mut fake = FakeCollaborator::new();
        let args = CommandArgs::new().with("data_inizio", "1998-01-01").with("funzionario", "Bianchi");
        run(&mut fake, "searchConsultazioni", args).unwrap();
        assert_eq!(
            fake.queries[0].1,
            vec![
                Value::Date(NaiveDate::from_ymd_opt(1998, 1, 1).unwrap()),
                Value::Null,
                Value::Null,
                Value::text("Bianchi"),
            ]
        );

        let bad = CommandArgs::new().with("data_fine", "31/12/1998");
        assert!(run(&mut fake, "searchConsultazioni", bad).unwrap_err().is_input_error());
        assert_eq!(fake.queries.len(), 1);
    }
}
