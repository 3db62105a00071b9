use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::adapters::FunctionalAdapter;
use crate::ast::Value;
use crate::error::VncError;
use crate::exception::canonical_class;
use crate::runtime::RuntimeCtx;

/// Payload of a host object. Implementors decide how the object prints and
/// whether it can be called like a function.
pub trait HostData: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn display(&self) -> Option<String> {
        None
    }

    fn as_functional(&self) -> Option<&FunctionalAdapter> {
        None
    }
}

/// Opaque host value with a class name. Identity is the shared payload.
#[derive(Clone)]
pub struct HostObject {
    class: Arc<str>,
    data: Arc<dyn HostData>,
}

impl HostObject {
    pub fn new<T: HostData>(class: &str, data: T) -> Self {
        Self {
            class: Arc::from(class),
            data: Arc::new(data),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn downcast<T: HostData>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.data) as *const () as usize
    }

    pub fn display(&self) -> String {
        self.data
            .display()
            .unwrap_or_else(|| format!("{}@{:x}", self.class, self.identity()))
    }

    pub fn functional(&self) -> Option<&FunctionalAdapter> {
        self.data.as_functional()
    }

    pub fn is_functional(&self) -> bool {
        self.functional().is_some()
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.display())
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

pub type ConstructorFn = Arc<dyn Fn(&[Value]) -> Result<Value, VncError> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&HostObject, &[Value]) -> Result<Value, VncError> + Send + Sync>;
pub type StaticFn = Arc<dyn Fn(&[Value]) -> Result<Value, VncError> + Send + Sync>;

/// A host class reachable from scripts. Only registered classes can be
/// constructed or called.
pub struct HostClass {
    name: String,
    supertypes: Vec<String>,
    constructor: Option<ConstructorFn>,
    methods: HashMap<String, MethodFn>,
    static_methods: HashMap<String, StaticFn>,
    static_fields: HashMap<String, Value>,
}

impl HostClass {
    pub fn builder(name: &str) -> HostClassBuilder {
        HostClassBuilder {
            class: HostClass {
                name: name.to_string(),
                supertypes: Vec::new(),
                constructor: None,
                methods: HashMap::new(),
                static_methods: HashMap::new(),
                static_fields: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct HostClassBuilder {
    class: HostClass,
}

impl HostClassBuilder {
    pub fn implements(mut self, supertype: &str) -> Self {
        self.class.supertypes.push(supertype.to_string());
        self
    }

    pub fn constructor(
        mut self,
        func: impl Fn(&[Value]) -> Result<Value, VncError> + Send + Sync + 'static,
    ) -> Self {
        self.class.constructor = Some(Arc::new(func));
        self
    }

    pub fn method(
        mut self,
        name: &str,
        func: impl Fn(&HostObject, &[Value]) -> Result<Value, VncError> + Send + Sync + 'static,
    ) -> Self {
        self.class.methods.insert(name.to_string(), Arc::new(func));
        self
    }

    pub fn static_method(
        mut self,
        name: &str,
        func: impl Fn(&[Value]) -> Result<Value, VncError> + Send + Sync + 'static,
    ) -> Self {
        self.class
            .static_methods
            .insert(name.to_string(), Arc::new(func));
        self
    }

    pub fn static_field(mut self, name: &str, value: Value) -> Self {
        self.class.static_fields.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> HostClass {
        self.class
    }
}

/// Per-interpreter table of host classes.
#[derive(Default)]
pub struct HostRegistry {
    classes: RwLock<HashMap<String, Arc<HostClass>>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, class: HostClass) {
        tracing::debug!(class = class.name(), "register host class");
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.name.clone(), Arc::new(class));
    }

    pub fn get(&self, name: &str) -> Option<Arc<HostClass>> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Full class name for a registered name, honouring the implicit
    /// `java.lang.` package.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let name = name.trim_start_matches(':');
        if self.contains(name) {
            return Some(name.to_string());
        }
        let implicit = format!("java.lang.{}", name);
        self.contains(&implicit).then_some(implicit)
    }
}

/// `(. :Class :method args...)`: constructor, static method or static field.
pub fn invoke_static(
    ctx: &RuntimeCtx,
    class_name: &str,
    method: &str,
    args: &[Value],
) -> Result<Value, VncError> {
    let class = ctx
        .hosts()
        .get(class_name)
        .ok_or_else(|| class_not_accessible(class_name))?;
    tracing::trace!(class = class_name, method, "host static call");
    if method == "new" {
        let constructor = class.constructor.as_ref().ok_or_else(|| {
            VncError::host(
                "UnsupportedOperationException",
                format!("{} has no accessible constructor", class_name),
            )
        })?;
        return constructor(args);
    }
    if let Some(func) = class.static_methods.get(method) {
        return func(args);
    }
    if args.is_empty() {
        if let Some(value) = class.static_fields.get(method) {
            return Ok(value.clone());
        }
    }
    Err(no_such_member(class_name, method))
}

/// `(. obj :method args...)` on a host object or a plain value.
pub fn invoke_method(
    ctx: &RuntimeCtx,
    receiver: &Value,
    method: &str,
    args: &[Value],
) -> Result<Value, VncError> {
    match receiver {
        Value::Host(obj) => {
            if let Some(adapter) = obj.functional() {
                if adapter.interface().method() == method {
                    return adapter.call_values(args);
                }
            }
            let class = ctx.hosts().get(obj.class_name());
            if let Some(func) = class.as_ref().and_then(|c| c.methods.get(method)) {
                return func(obj, args);
            }
            match method {
                "toString" => Ok(Value::string(obj.display())),
                "equals" if args.len() == 1 => Ok(Value::Bool(receiver == &args[0])),
                "hashCode" => Ok(Value::Long(obj.identity() as i64)),
                "getClass" => Ok(Value::keyword(obj.class_name())),
                _ => Err(no_such_member(obj.class_name(), method)),
            }
        }
        Value::String(s) => crate::host_classes::string_method(s, method, args),
        Value::Nil => Err(VncError::host(
            "NullPointerException",
            format!("Cannot invoke '{}' on nil", method),
        )),
        other => match method {
            "toString" => Ok(Value::string(other.to_string())),
            "equals" if args.len() == 1 => Ok(Value::Bool(other == &args[0])),
            "getClass" => Ok(class_of(other)),
            _ => Err(no_such_member(&host_class_name(other), method)),
        },
    }
}

/// Calls a host functional object (an adapter) with script values.
pub fn call_functional(obj: &HostObject, args: &[Value]) -> Result<Value, VncError> {
    match obj.functional() {
        Some(adapter) => adapter.call_values(args),
        None => Err(VncError::runtime(format!(
            "Host object {} is not a function",
            obj.class_name()
        ))),
    }
}

/// Java-style class name of a value, used by `class` and `instance-of?`.
pub fn host_class_name(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(_) => "java.lang.Boolean".to_string(),
        Value::Long(_) => "java.lang.Long".to_string(),
        Value::Double(_) => "java.lang.Double".to_string(),
        Value::Decimal(_) => "java.math.BigDecimal".to_string(),
        Value::BigInt(_) => "java.math.BigInteger".to_string(),
        Value::String(_) => "java.lang.String".to_string(),
        Value::Char(_) => "java.lang.Character".to_string(),
        Value::Host(obj) => obj.class_name().to_string(),
        Value::Exception(ex) => ex.class.clone(),
        other => format!("core/{}", other.type_name()),
    }
}

pub fn class_of(value: &Value) -> Value {
    match value {
        Value::Nil => Value::Nil,
        other => Value::keyword(host_class_name(other)),
    }
}

/// `(instance-of? :java.util.List obj)`: exact class, declared supertypes of a
/// registered class, or the exception hierarchy.
pub fn instance_of(ctx: &RuntimeCtx, class: &str, value: &Value) -> bool {
    let wanted = class.trim_start_matches(':');
    match value {
        Value::Nil => false,
        Value::Exception(ex) => ex.is_instance_of(&canonical_class(wanted)),
        Value::Host(obj) => {
            if obj.class_name() == wanted {
                return true;
            }
            let full = ctx.hosts().resolve(wanted).unwrap_or_else(|| wanted.to_string());
            ctx.hosts()
                .get(obj.class_name())
                .map(|c| c.name == full || c.supertypes.iter().any(|s| *s == full || *s == wanted))
                .unwrap_or(false)
                || obj
                    .functional()
                    .map(|a| a.interface().class_name() == full || a.interface().class_name() == wanted)
                    .unwrap_or(false)
        }
        other => {
            let name = host_class_name(other);
            if name == wanted || name.rsplit('.').next() == Some(wanted) {
                return true;
            }
            match wanted {
                "java.lang.Object" | "Object" => true,
                "java.lang.Number" | "Number" => other.is_number(),
                "java.lang.CharSequence" | "CharSequence" => matches!(other, Value::String(_)),
                _ => Value::keyword(wanted) == other.type_keyword(),
            }
        }
    }
}

fn class_not_accessible(class_name: &str) -> VncError {
    VncError::runtime(format!(
        "Class '{}' is not registered for host interop",
        class_name
    ))
}

fn no_such_member(class_name: &str, member: &str) -> VncError {
    VncError::runtime(format!(
        "No method or field '{}' on class {}",
        member, class_name
    ))
}

/// Validates the argument count of a host method.
pub fn expect_host_args(
    method: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), VncError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}..{}", min, max)
        };
        return Err(VncError::arity(format!(
            "Method {} expects {} argument(s), got {}",
            method,
            expected,
            args.len()
        )));
    }
    Ok(())
}
