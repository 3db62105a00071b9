use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bigdecimal::BigDecimal;
use im::{HashMap, HashSet, OrdMap, OrdSet, Vector};
use num_bigint::BigInt;

use crate::collections::OrderedMap;
use crate::concurrency::AtomHandle;
use crate::env::EnvRef;
use crate::error::VncError;
use crate::exception::ExceptionData;
use crate::interop::HostObject;
use crate::number;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub index: usize,
}

pub type MetaEntries = Arc<Vec<(Form, Form)>>;

/// A node of the expression tree produced by the reader. Children are shared
/// so cloning a form is cheap; span and metadata never take part in equality.
#[derive(Clone, Debug)]
pub struct Form {
    pub kind: FormKind,
    pub span: Span,
    pub meta: Option<MetaEntries>,
}

#[derive(Clone, Debug)]
pub enum FormKind {
    Nil,
    Bool(bool),
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    BigInt(BigInt),
    Str(Arc<str>),
    Char(char),
    Keyword(Arc<str>),
    Symbol(Arc<str>),
    List(Arc<[Form]>),
    Vector(Arc<[Form]>),
    Map(Arc<[(Form, Form)]>),
    Set(Arc<[Form]>),
    /// Runtime value spliced into code by a macro expansion.
    Value(Value),
}

impl Form {
    pub fn new(kind: FormKind, span: Span) -> Self {
        Self {
            kind,
            span,
            meta: None,
        }
    }

    pub fn symbol(name: &str, span: Span) -> Self {
        Self::new(FormKind::Symbol(Arc::from(name)), span)
    }

    pub fn list(items: Vec<Form>, span: Span) -> Self {
        Self::new(FormKind::List(Arc::from(items)), span)
    }

    pub fn vector(items: Vec<Form>, span: Span) -> Self {
        Self::new(FormKind::Vector(Arc::from(items)), span)
    }

    pub fn with_meta(mut self, meta: Option<MetaEntries>) -> Self {
        self.meta = meta;
        self
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            FormKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match &self.kind {
            FormKind::Keyword(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Form]> {
        match &self.kind {
            FormKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Form]> {
        match &self.kind {
            FormKind::Vector(items) => Some(items),
            _ => None,
        }
    }

    /// Head symbol of a list form, e.g. `def` for `(def x 1)`.
    pub fn head_symbol(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(|f| f.as_symbol())
    }

    /// Metadata flag such as `^:dynamic` or `^:private`.
    pub fn meta_flag(&self, key: &str) -> bool {
        self.meta_get(key)
            .map(|f| !matches!(f.kind, FormKind::Nil | FormKind::Bool(false)))
            .unwrap_or(false)
    }

    pub fn meta_get(&self, key: &str) -> Option<&Form> {
        self.meta.as_ref().and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k.as_keyword() == Some(key))
                .map(|(_, v)| v)
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FnArity {
    min: usize,
    max: Option<usize>,
}

impl FnArity {
    pub fn new(min: usize, max: Option<usize>) -> Self {
        Self { min, max }
    }

    pub fn exact(count: usize) -> Self {
        Self::new(count, Some(count))
    }

    pub fn at_least(min: usize) -> Self {
        Self::new(min, None)
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self::new(min, Some(max.max(min)))
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }

    pub fn describe(&self) -> String {
        match self.max {
            Some(max) if max == self.min => format!("{}", self.min),
            Some(max) => format!("{}..{}", self.min, max),
            None => format!("{}+", self.min),
        }
    }
}

type NativeBody = dyn Fn(&[Value]) -> Result<Value, VncError> + Send + Sync;

pub struct NativeFn {
    func: Box<NativeBody>,
    arity: FnArity,
    name: Arc<str>,
    doc: Option<String>,
}

impl NativeFn {
    pub fn new(
        name: &str,
        arity: FnArity,
        func: impl Fn(&[Value]) -> Result<Value, VncError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            func: Box::new(func),
            arity,
            name: Arc::from(name),
            doc: None,
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, VncError> {
        (self.func)(args)
    }

    pub fn arity(&self) -> FnArity {
        self.arity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

/// One arity of a closure: fixed parameter patterns, optional variadic tail
/// and a body already wrapped in a single `do` form.
#[derive(Clone, Debug)]
pub struct FnClause {
    pub params: Vec<Form>,
    pub rest: Option<Form>,
    pub body: Form,
}

impl FnClause {
    pub fn accepts(&self, count: usize) -> bool {
        match self.rest {
            Some(_) => count >= self.params.len(),
            None => count == self.params.len(),
        }
    }
}

pub struct Lambda {
    pub name: Option<Arc<str>>,
    pub ns: Arc<str>,
    pub clauses: Vec<FnClause>,
    pub env: EnvRef,
    pub doc: Option<String>,
    pub private: bool,
}

impl Lambda {
    /// Fixed arities win over variadic ones.
    pub fn select_clause(&self, count: usize) -> Option<&FnClause> {
        self.clauses
            .iter()
            .find(|c| c.rest.is_none() && c.accepts(count))
            .or_else(|| self.clauses.iter().find(|c| c.accepts(count)))
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{}/{}", self.ns, name),
            None => "anonymous".to_string(),
        }
    }

    pub fn arities(&self) -> String {
        self.clauses
            .iter()
            .map(|c| match c.rest {
                Some(_) => format!("{}+", c.params.len()),
                None => c.params.len().to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    BigInt(BigInt),
    String(Arc<str>),
    Char(char),
    Keyword(Arc<str>),
    /// Metadata read as `^:dynamic name` rides along so macro output keeps it.
    Symbol(Arc<str>, Option<MetaEntries>),
    List(Vector<Value>),
    Vector(Vector<Value>),
    Map(HashMap<Value, Value>),
    OrderedMap(OrderedMap),
    SortedMap(OrdMap<Value, Value>),
    Set(HashSet<Value>),
    SortedSet(OrdSet<Value>),
    Fn(Arc<Lambda>),
    Macro(Arc<Lambda>),
    Native(Arc<NativeFn>),
    Atom(AtomHandle),
    Exception(Arc<ExceptionData>),
    Host(HostObject),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn keyword(s: impl AsRef<str>) -> Self {
        Value::Keyword(Arc::from(s.as_ref()))
    }

    pub fn symbol(s: impl AsRef<str>) -> Self {
        Value::Symbol(Arc::from(s.as_ref()), None)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn vector(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Vector(items.into_iter().collect())
    }

    pub fn native_fn_with_name(
        name: &str,
        arity: FnArity,
        func: impl Fn(&[Value]) -> Result<Value, VncError> + Send + Sync + 'static,
    ) -> Self {
        Value::Native(Arc::new(NativeFn::new(name, arity, func)))
    }

    pub fn native_fn_with_doc(
        name: &str,
        arity: FnArity,
        doc: &str,
        func: impl Fn(&[Value]) -> Result<Value, VncError> + Send + Sync + 'static,
    ) -> Self {
        let mut native = NativeFn::new(name, arity, func);
        native.doc = Some(doc.to_string());
        Value::Native(Arc::new(native))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Long(_) | Value::Double(_) | Value::Decimal(_) | Value::BigInt(_)
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Fn(_)
                | Value::Native(_)
                | Value::Keyword(_)
                | Value::Map(_)
                | Value::OrderedMap(_)
                | Value::SortedMap(_)
                | Value::Set(_)
                | Value::SortedSet(_)
                | Value::Vector(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Char(_) => "char",
            Value::Keyword(_) => "keyword",
            Value::Symbol(..) => "symbol",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "hash-map",
            Value::OrderedMap(_) => "ordered-map",
            Value::SortedMap(_) => "sorted-map",
            Value::Set(_) => "hash-set",
            Value::SortedSet(_) => "sorted-set",
            Value::Fn(_) | Value::Native(_) => "function",
            Value::Macro(_) => "macro",
            Value::Atom(_) => "atom",
            Value::Exception(_) => "exception",
            Value::Host(_) => "host-object",
        }
    }

    /// Keyword returned by `(type x)`.
    pub fn type_keyword(&self) -> Value {
        match self {
            Value::Exception(ex) => Value::keyword(&ex.class),
            Value::Host(obj) => Value::keyword(obj.class_name()),
            other => Value::keyword(format!("core/{}", other.type_name())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of a keyword, symbol or string.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Keyword(s) | Value::Symbol(s, _) | Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Long(_) | Value::Double(_) | Value::Decimal(_) | Value::BigInt(_) => 2,
            Value::Char(_) => 3,
            Value::String(_) => 4,
            Value::Keyword(_) => 5,
            Value::Symbol(..) => 6,
            Value::List(_) | Value::Vector(_) => 7,
            Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => 8,
            Value::Set(_) | Value::SortedSet(_) => 9,
            Value::Fn(_) | Value::Macro(_) | Value::Native(_) => 10,
            Value::Atom(_) => 11,
            Value::Exception(_) => 12,
            Value::Host(_) => 13,
        }
    }

    fn numeric_rank(&self) -> u8 {
        match self {
            Value::Long(_) => 0,
            Value::BigInt(_) => 1,
            Value::Double(_) => 2,
            Value::Decimal(_) => 3,
            _ => 4,
        }
    }

    pub(crate) fn sequential_items(&self) -> Option<&Vector<Value>> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn map_entries(&self) -> Option<Vec<(Value, Value)>> {
        match self {
            Value::Map(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Value::OrderedMap(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Value::SortedMap(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            _ => None,
        }
    }

    pub(crate) fn map_lookup(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Map(m) => m.get(key).cloned(),
            Value::OrderedMap(m) => m.get(key).cloned(),
            Value::SortedMap(m) => m.get(key).cloned(),
            _ => None,
        }
    }

    fn map_len(&self) -> usize {
        match self {
            Value::Map(m) => m.len(),
            Value::OrderedMap(m) => m.len(),
            Value::SortedMap(m) => m.len(),
            _ => 0,
        }
    }

    pub(crate) fn set_contains(&self, item: &Value) -> bool {
        match self {
            Value::Set(s) => s.contains(item),
            Value::SortedSet(s) => s.contains(item),
            _ => false,
        }
    }

    pub(crate) fn set_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Set(s) => Some(s.iter().cloned().collect()),
            Value::SortedSet(s) => Some(s.iter().cloned().collect()),
            _ => None,
        }
    }

    fn set_len(&self) -> usize {
        match self {
            Value::Set(s) => s.len(),
            Value::SortedSet(s) => s.len(),
            _ => 0,
        }
    }
}

fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn identity<T: ?Sized>(ptr: &Arc<T>) -> usize {
    Arc::as_ptr(ptr) as *const () as usize
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Decimal(a), Decimal(b)) => a == b,
            (BigInt(a), BigInt(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Keyword(a), Keyword(b)) => a == b,
            (Symbol(a, _), Symbol(b, _)) => a == b,
            (List(a) | Vector(a), List(b) | Vector(b)) => a == b,
            (
                Map(_) | OrderedMap(_) | SortedMap(_),
                Map(_) | OrderedMap(_) | SortedMap(_),
            ) => {
                self.map_len() == other.map_len()
                    && self.map_entries().map_or(false, |entries| {
                        entries
                            .iter()
                            .all(|(k, v)| other.map_lookup(k).as_ref() == Some(v))
                    })
            }
            (Set(_) | SortedSet(_), Set(_) | SortedSet(_)) => {
                self.set_len() == other.set_len()
                    && self
                        .set_items()
                        .map_or(false, |items| items.iter().all(|i| other.set_contains(i)))
            }
            (Fn(a), Fn(b)) | (Macro(a), Macro(b)) => Arc::ptr_eq(a, b),
            (Native(a), Native(b)) => Arc::ptr_eq(a, b),
            (Atom(a), Atom(b)) => a.ptr_eq(b),
            (Exception(a), Exception(b)) => Arc::ptr_eq(a, b),
            (Host(a), Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Long(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            Value::Double(d) => {
                2u8.hash(state);
                let normalized = if *d == 0.0 { 0.0f64 } else { *d };
                normalized.to_bits().hash(state);
            }
            Value::Decimal(d) => {
                3u8.hash(state);
                d.hash(state);
            }
            Value::BigInt(n) => {
                1u8.hash(state);
                n.hash(state);
            }
            Value::String(s) | Value::Keyword(s) | Value::Symbol(s, _) => s.hash(state),
            Value::Char(c) => c.hash(state),
            Value::List(items) | Value::Vector(items) => {
                items.len().hash(state);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => {
                let mut acc: u64 = 0;
                for (k, v) in self.map_entries().unwrap_or_default() {
                    acc = acc.wrapping_add(hash_one(&(k, v)));
                }
                acc.hash(state);
            }
            Value::Set(_) | Value::SortedSet(_) => {
                let mut acc: u64 = 0;
                for item in self.set_items().unwrap_or_default() {
                    acc = acc.wrapping_add(hash_one(&item));
                }
                acc.hash(state);
            }
            Value::Fn(f) | Value::Macro(f) => identity(f).hash(state),
            Value::Native(f) => identity(f).hash(state),
            Value::Atom(a) => a.identity().hash(state),
            Value::Exception(e) => identity(e).hash(state),
            Value::Host(h) => h.identity().hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Nil, Nil) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Char(a), Char(b)) => a.cmp(b),
            (String(a), String(b)) | (Keyword(a), Keyword(b)) | (Symbol(a, _), Symbol(b, _)) => {
                a.cmp(b)
            }
            (List(a) | Vector(a), List(b) | Vector(b)) => a.iter().cmp(b.iter()),
            _ if self.is_number() => number::total_cmp(self, other)
                .then_with(|| self.numeric_rank().cmp(&other.numeric_rank())),
            (
                Map(_) | OrderedMap(_) | SortedMap(_),
                Map(_) | OrderedMap(_) | SortedMap(_),
            ) => {
                let mut a = self.map_entries().unwrap_or_default();
                let mut b = other.map_entries().unwrap_or_default();
                a.sort();
                b.sort();
                a.cmp(&b)
            }
            (Set(_) | SortedSet(_), Set(_) | SortedSet(_)) => {
                let mut a = self.set_items().unwrap_or_default();
                let mut b = other.set_items().unwrap_or_default();
                a.sort();
                b.sort();
                a.cmp(&b)
            }
            (Fn(a) | Macro(a), Fn(b) | Macro(b)) => identity(a).cmp(&identity(b)),
            (Native(a), Native(b)) => identity(a).cmp(&identity(b)),
            (Fn(_) | Macro(_), Native(_)) => Ordering::Less,
            (Native(_), Fn(_) | Macro(_)) => Ordering::Greater,
            (Atom(a), Atom(b)) => a.identity().cmp(&b.identity()),
            (Exception(a), Exception(b)) => identity(a).cmp(&identity(b)),
            (Host(a), Host(b)) => a.identity().cmp(&b.identity()),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pr_str())
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lambda({})", self.display_name())
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_and_vector_with_equal_items_are_equal() {
        let a = Value::list(vec![Value::Long(1), Value::Long(2)]);
        let b = Value::vector(vec![Value::Long(1), Value::Long(2)]);
        assert_eq!(a, b);
        assert_eq!(hash_one(&a), hash_one(&b));
    }

    #[test]
    fn numbers_of_different_types_are_not_equal() {
        assert_ne!(Value::Long(1), Value::Double(1.0));
        assert_eq!(Value::Long(1).cmp(&Value::Double(2.0)), Ordering::Less);
        assert_ne!(Value::Long(1).cmp(&Value::Double(1.0)), Ordering::Equal);
    }

    #[test]
    fn maps_compare_by_entries() {
        let mut a = HashMap::new();
        a.insert(Value::keyword("a"), Value::Long(1));
        let mut b = OrdMap::new();
        b.insert(Value::keyword("a"), Value::Long(1));
        assert_eq!(Value::Map(a.clone()), Value::SortedMap(b));
        assert_eq!(hash_one(&Value::Map(a.clone())), hash_one(&Value::Map(a)));
    }
}
