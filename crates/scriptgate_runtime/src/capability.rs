//! Host capabilities injected into every script namespace.
//!
//! The registry is built once per runner and never changes afterwards; each
//! execution only reads it. A capability is either a host function or a
//! string constant, and declares which execution modes may see it.

use crate::args::Args;
use crate::host::{HostContext, HostFunction, Mode};
use crate::value::{type_error, value_error, DictMap, Key, Value};
use indexmap::IndexMap;
use scriptgate_core::{ColumnType, DataSourceId, DataSourceRef, GateResult, Parameters, QueryId, TenantRef};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Column type constants, `TYPE_<UPPERCASE>`
pub const TYPE_CONSTANTS: [(&str, ColumnType); 6] = [
    ("TYPE_DATETIME", ColumnType::Datetime),
    ("TYPE_BOOLEAN", ColumnType::Boolean),
    ("TYPE_INTEGER", ColumnType::Integer),
    ("TYPE_STRING", ColumnType::String),
    ("TYPE_DATE", ColumnType::Date),
    ("TYPE_FLOAT", ColumnType::Float),
];

/// Modes a capability is visible in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Standard and secure mode
    Everywhere,
    /// Standard mode only
    StandardOnly,
}

impl Availability {
    /// Whether the capability is visible in `mode`
    #[must_use]
    pub fn allows(&self, mode: Mode) -> bool {
        match self {
            Self::Everywhere => true,
            Self::StandardOnly => mode == Mode::Standard,
        }
    }
}

/// What a capability provides
#[derive(Debug, Clone, Copy)]
pub enum CapabilityKind {
    /// Callable host function
    Function(HostFunction),
    /// String constant
    Constant(&'static str),
}

/// Registered capability
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    /// Name in the script namespace
    pub name: &'static str,
    /// Function or constant
    pub kind: CapabilityKind,
    /// Visible modes
    pub availability: Availability,
    /// One-line description for listings
    pub summary: &'static str,
}

impl Capability {
    /// Host function capability visible everywhere
    #[must_use]
    pub const fn function(name: &'static str, implementation: crate::host::HostFn, summary: &'static str) -> Self {
        Self {
            name,
            kind: CapabilityKind::Function(HostFunction::new(name, implementation)),
            availability: Availability::Everywhere,
            summary,
        }
    }

    /// Constant capability visible everywhere
    #[must_use]
    pub const fn constant(name: &'static str, value: &'static str, summary: &'static str) -> Self {
        Self {
            name,
            kind: CapabilityKind::Constant(value),
            availability: Availability::Everywhere,
            summary,
        }
    }

    /// Restrict to standard mode
    #[must_use]
    pub const fn standard_only(mut self) -> Self {
        self.availability = Availability::StandardOnly;
        self
    }

    /// Script value for the namespace
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self.kind {
            CapabilityKind::Function(f) => Value::Host(f),
            CapabilityKind::Constant(s) => Value::string(s),
        }
    }
}

/// Capability registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Name already registered
    #[error("capability '{0}' is already registered")]
    Duplicate(String),
}

impl From<CapabilityError> for scriptgate_core::ScriptError {
    fn from(err: CapabilityError) -> Self {
        Self::runtime("ValueError", err.to_string())
    }
}

/// Append-only capability table
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: IndexMap<&'static str, Capability>,
}

impl CapabilityRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Duplicate` if the name is taken
    pub fn register(&mut self, capability: Capability) -> Result<(), CapabilityError> {
        if self.entries.contains_key(capability.name) {
            return Err(CapabilityError::Duplicate(capability.name.to_string()));
        }
        self.entries.insert(capability.name, capability);
        Ok(())
    }

    /// The capabilities every runner exposes
    #[must_use]
    pub fn standard() -> Self {
        let mut entries = IndexMap::new();
        for capability in standard_capabilities() {
            entries.insert(capability.name, capability);
        }
        debug!(capabilities = entries.len(), "capability registry built");
        Self { entries }
    }

    /// Capability by name, regardless of mode
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    /// Namespace value of `name` if visible in `mode`
    #[must_use]
    pub fn lookup(&self, name: &str, mode: Mode) -> Option<Value> {
        self.entries
            .get(name)
            .filter(|c| c.availability.allows(mode))
            .map(Capability::to_value)
    }

    /// Capabilities visible in `mode`, in registration order
    pub fn available(&self, mode: Mode) -> impl Iterator<Item = &Capability> {
        self.entries.values().filter(move |c| c.availability.allows(mode))
    }

    /// Number of registered capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn standard_capabilities() -> Vec<Capability> {
    let mut caps = vec![
        Capability::function(
            "add_result_column",
            add_result_column,
            "add_result_column(result, name, friendly_name, type): declare a result column",
        ),
        Capability::function(
            "add_result_row",
            add_result_row,
            "add_result_row(result, values): append a row keyed by declared columns",
        ),
        Capability::function("disable_print_log", disable_print_log, "stop recording print output"),
        Capability::function("enable_print_log", enable_print_log, "resume recording print output"),
        Capability::function(
            "execute_query",
            execute_query,
            "execute_query(data_source, query): run a query as the service",
        ),
        Capability::function(
            "execute_restricted_query",
            execute_restricted_query,
            "execute_restricted_query(data_source_name, query): run a query the caller may access",
        ),
        Capability::function(
            "execute_shared_query",
            execute_shared_query,
            "execute_shared_query(tenant_id, query[, parameters]): delegate a query to a tenant",
        ),
        Capability::function(
            "get_source_schema",
            get_source_schema,
            "get_source_schema(data_source): tables and columns of a data source",
        ),
        Capability::function(
            "get_query_result",
            get_query_result,
            "get_query_result(query_id): latest cached data of a saved query",
        ),
        Capability::function(
            "tenant_id2name",
            tenant_id2name,
            "tenant_id2name(tenant_id): table name of a tenant",
        ),
        Capability::function(
            "get_current_user",
            get_current_user,
            "get_current_user(): the invoking user",
        )
        .standard_only(),
    ];
    caps.extend(
        TYPE_CONSTANTS
            .iter()
            .map(|&(name, ty)| Capability::constant(name, ty.as_str(), "result column type")),
    );
    caps
}

fn result_dict(value: Option<&Value>, func: &str) -> GateResult<Rc<RefCell<DictMap>>> {
    match value {
        Some(Value::Dict(map)) => Ok(Rc::clone(map)),
        Some(other) => Err(type_error(format!(
            "{func}() expects the result dict, not {}",
            other.type_name()
        ))),
        None => Err(type_error(format!("{func}() missing the result argument"))),
    }
}

fn list_entry(result: &Rc<RefCell<DictMap>>, key: &str) -> GateResult<Rc<RefCell<Vec<Value>>>> {
    let existing = result.borrow().get(&Key::str(key)).cloned();
    match existing {
        Some(Value::List(items)) => Ok(items),
        Some(other) => Err(type_error(format!(
            "result['{key}'] must be a list, not {}",
            other.type_name()
        ))),
        None => {
            let items = Rc::new(RefCell::new(Vec::new()));
            result
                .borrow_mut()
                .insert(Key::str(key), Value::List(Rc::clone(&items)));
            Ok(items)
        }
    }
}

fn declared_columns(result: &Rc<RefCell<DictMap>>) -> GateResult<Vec<String>> {
    let columns = list_entry(result, "columns")?;
    let columns = columns.borrow();
    Ok(columns
        .iter()
        .filter_map(|c| match c {
            Value::Dict(map) => map
                .borrow()
                .get(&Key::str("name"))
                .and_then(|n| n.as_str().map(str::to_string)),
            _ => None,
        })
        .collect())
}

fn add_result_column(_ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "add_result_column";
    args.no_keywords(NAME)?;
    args.expect(NAME, 4, 4)?;
    let result = result_dict(args.get(0), NAME)?;
    let name = args.str_at(NAME, 1)?;
    let friendly_name = args.str_at(NAME, 2)?;
    let column_type: ColumnType = args.str_at(NAME, 3)?.parse()?;

    let mut column = DictMap::new();
    column.insert(Key::str("name"), Value::string(name));
    column.insert(Key::str("friendly_name"), Value::string(friendly_name));
    column.insert(Key::str("type"), Value::string(column_type.as_str()));
    list_entry(&result, "columns")?
        .borrow_mut()
        .push(Value::dict(column));
    Ok(Value::None)
}

fn add_result_row(_ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "add_result_row";
    args.no_keywords(NAME)?;
    args.expect(NAME, 2, 2)?;
    let result = result_dict(args.get(0), NAME)?;
    let row = match args.get(1) {
        Some(Value::Dict(map)) => Rc::clone(map),
        Some(other) => {
            return Err(type_error(format!(
                "{NAME}() expects a dict of column values, not {}",
                other.type_name()
            )));
        }
        None => return Err(type_error(format!("{NAME}() missing the values argument"))),
    };
    let declared = declared_columns(&result)?;
    for key in row.borrow().keys() {
        let declared_key = match key {
            Key::Str(s) => declared.iter().any(|d| d.as_str() == &**s),
            _ => false,
        };
        if !declared_key {
            return Err(value_error(format!(
                "{} is not a declared result column",
                key.to_value().repr()
            )));
        }
    }
    list_entry(&result, "rows")?.borrow_mut().push(Value::Dict(row));
    Ok(Value::None)
}

fn disable_print_log(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    args.expect("disable_print_log", 0, 0)?;
    ctx.output.disable();
    Ok(Value::None)
}

fn enable_print_log(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    args.expect("enable_print_log", 0, 0)?;
    ctx.output.enable();
    Ok(Value::None)
}

fn source_ref(value: Option<&Value>, func: &str) -> GateResult<DataSourceRef> {
    match value {
        Some(Value::Int(id)) => Ok(DataSourceRef::Id(DataSourceId(*id))),
        Some(Value::Str(name)) => Ok(DataSourceRef::Name(name.to_string())),
        Some(other) => Err(type_error(format!(
            "{func}() data source must be a name or an id, not {}",
            other.type_name()
        ))),
        None => Err(type_error(format!("{func}() missing the data source argument"))),
    }
}

fn tenant_ref(value: Option<&Value>, func: &str) -> GateResult<TenantRef> {
    match value {
        Some(Value::Int(id)) => Ok(TenantRef(*id)),
        Some(Value::Str(s)) => s
            .parse::<TenantRef>()
            .map_err(|_| value_error(format!("invalid tenant id: {}", crate::value::quote_str(s)))),
        Some(other) => Err(type_error(format!(
            "{func}() tenant id must be int or str, not {}",
            other.type_name()
        ))),
        None => Err(type_error(format!("{func}() missing the tenant id argument"))),
    }
}

fn execute_query(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "execute_query";
    args.no_keywords(NAME)?;
    args.expect(NAME, 2, 2)?;
    let reference = source_ref(args.get(0), NAME)?;
    let query = args.str_at(NAME, 1)?;
    let data = ctx.gateway()?.execute_query(&reference, query)?;
    Ok(Value::from_json(&data))
}

fn execute_restricted_query(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "execute_restricted_query";
    args.no_keywords(NAME)?;
    args.expect(NAME, 2, 2)?;
    let name = args.str_at(NAME, 0)?;
    let query = args.str_at(NAME, 1)?;
    let data = ctx
        .gateway()?
        .execute_restricted_query(ctx.caller(), name, query)?;
    Ok(Value::from_json(&data))
}

fn execute_shared_query(ctx: &mut HostContext<'_>, mut args: Args) -> GateResult<Value> {
    const NAME: &str = "execute_shared_query";
    let keyword_params = args.take_keyword("parameters");
    args.no_keywords(NAME)?;
    args.expect(NAME, 2, 3)?;
    let tenant = tenant_ref(args.get(0), NAME)?;
    let query = args.str_at(NAME, 1)?;
    let parameters = match args.get(2).or(keyword_params.as_ref()) {
        None | Some(Value::None) => ctx
            .parameters()
            .map(|table| table.to_parameters())
            .unwrap_or_default(),
        Some(value @ Value::Dict(_)) => match value.to_json()? {
            serde_json::Value::Object(map) => map,
            _ => Parameters::new(),
        },
        Some(other) => {
            return Err(type_error(format!(
                "{NAME}() parameters must be a dict, not {}",
                other.type_name()
            )));
        }
    };
    let data = ctx
        .gateway()?
        .execute_shared_query(ctx.caller(), tenant, query, parameters)?;
    Ok(Value::from_json(&data))
}

fn get_source_schema(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "get_source_schema";
    args.no_keywords(NAME)?;
    args.expect(NAME, 1, 1)?;
    let reference = source_ref(args.get(0), NAME)?;
    let schema = ctx.gateway()?.get_source_schema(&reference)?;
    Ok(Value::from_json(&schema))
}

fn get_query_result(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "get_query_result";
    args.no_keywords(NAME)?;
    args.expect(NAME, 1, 1)?;
    let query_id = QueryId(args.int_at(NAME, 0)?);
    let data = ctx.gateway()?.get_query_result(query_id)?;
    Ok(Value::from_json(&data))
}

fn tenant_id2name(_ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    const NAME: &str = "tenant_id2name";
    args.no_keywords(NAME)?;
    args.expect(NAME, 1, 1)?;
    Ok(Value::string(tenant_ref(args.get(0), NAME)?.table_name()))
}

fn get_current_user(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
    args.expect("get_current_user", 0, 0)?;
    let principal = ctx.gateway()?.current_principal(ctx.caller())?;
    Ok(Value::from_json(&principal.to_json()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptgate_gateway::CallerContext;

    fn call(name: &str, ctx: &mut HostContext<'_>, args: Vec<Value>) -> GateResult<Value> {
        let registry = CapabilityRegistry::standard();
        match registry.get(name).map(|c| c.kind) {
            Some(CapabilityKind::Function(f)) => f.call(ctx, Args::positional(args)),
            _ => panic!("{name} is not a function"),
        }
    }

    fn empty_result() -> Value {
        let mut map = DictMap::new();
        map.insert(Key::str("columns"), Value::list(vec![]));
        map.insert(Key::str("rows"), Value::list(vec![]));
        Value::dict(map)
    }

    #[test]
    fn test_registry_contents() {
        let registry = CapabilityRegistry::standard();
        assert!(registry.lookup("execute_shared_query", Mode::Secure).is_some());
        assert!(registry.lookup("get_current_user", Mode::Standard).is_some());
        assert!(registry.lookup("get_current_user", Mode::Secure).is_none());
        assert_eq!(
            registry.lookup("TYPE_INTEGER", Mode::Secure).unwrap().to_display(),
            "integer"
        );
        let standard = registry.available(Mode::Standard).count();
        let secure = registry.available(Mode::Secure).count();
        assert_eq!(standard, secure + 1);
    }

    #[test]
    fn test_type_constants_cover_every_column_type() {
        for ty in ColumnType::ALL {
            assert!(TYPE_CONSTANTS.iter().any(|(name, t)| *t == ty && *name == ty.constant_name()));
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = CapabilityRegistry::standard();
        let err = registry
            .register(Capability::constant("TYPE_DATE", "date", ""))
            .unwrap_err();
        assert_eq!(err, CapabilityError::Duplicate("TYPE_DATE".to_string()));
        assert_eq!(
            scriptgate_core::ScriptError::from(err).to_string(),
            "ValueError: capability 'TYPE_DATE' is already registered"
        );
    }

    #[test]
    fn test_add_column_and_row() {
        let caller = CallerContext::new(None);
        let mut ctx = HostContext::new(&caller, Mode::Standard);
        let result = empty_result();
        call(
            "add_result_column",
            &mut ctx,
            vec![result.clone(), Value::string("a"), Value::string("A"), Value::string("integer")],
        )
        .unwrap();
        let mut row = DictMap::new();
        row.insert(Key::str("a"), Value::Int(1));
        call("add_result_row", &mut ctx, vec![result.clone(), Value::dict(row)]).unwrap();
        assert_eq!(
            result.to_json().unwrap(),
            serde_json::json!({
                "columns": [{"name": "a", "friendly_name": "A", "type": "integer"}],
                "rows": [{"a": 1}]
            })
        );
    }

    #[test]
    fn test_bad_column_type_and_undeclared_row_key() {
        let caller = CallerContext::new(None);
        let mut ctx = HostContext::new(&caller, Mode::Standard);
        let result = empty_result();
        let err = call(
            "add_result_column",
            &mut ctx,
            vec![result.clone(), Value::string("a"), Value::string("A"), Value::string("decimal")],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ValueError");

        let mut row = DictMap::new();
        row.insert(Key::str("b"), Value::Int(1));
        let err = call("add_result_row", &mut ctx, vec![result, Value::dict(row)]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: 'b' is not a declared result column");
    }

    #[test]
    fn test_tenant_id2name() {
        let caller = CallerContext::new(None);
        let mut ctx = HostContext::new(&caller, Mode::Secure);
        let name = call("tenant_id2name", &mut ctx, vec![Value::string(" 42 ")]).unwrap();
        assert_eq!(name.to_display(), "tenant_42");
        assert!(call("tenant_id2name", &mut ctx, vec![Value::string("x")]).is_err());
    }

    #[test]
    fn test_print_log_toggle() {
        let caller = CallerContext::new(None);
        let mut ctx = HostContext::new(&caller, Mode::Standard);
        call("disable_print_log", &mut ctx, vec![]).unwrap();
        assert!(!ctx.output.is_enabled());
        call("enable_print_log", &mut ctx, vec![]).unwrap();
        assert!(ctx.output.is_enabled());
    }
}
