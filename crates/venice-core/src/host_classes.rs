use std::any::Any;
use std::collections::HashMap as StdHashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::Value;
use crate::collections::seq_items;
use crate::error::VncError;
use crate::eval::call_callable;
use crate::interop::{expect_host_args, HostClass, HostData, HostObject, HostRegistry};
use crate::number;
use crate::options::{SharedReader, SharedWriter, VeniceOptions};
use crate::runtime::RuntimeCtx;

pub const PRINT_STREAM: &str = "java.io.PrintStream";
pub const STRING_WRITER: &str = "java.io.StringWriter";
pub const BUFFERED_READER: &str = "java.io.BufferedReader";
pub const STRING_BUILDER: &str = "java.lang.StringBuilder";
pub const ARRAY_LIST: &str = "java.util.ArrayList";
pub const HASH_MAP: &str = "java.util.HashMap";
pub const THREAD: &str = "java.lang.Thread";

static START: Lazy<Instant> = Lazy::new(Instant::now);

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn data<'a, T: HostData>(this: &'a HostObject) -> Result<&'a T, VncError> {
    this.downcast::<T>().ok_or_else(|| {
        VncError::host(
            "ClassCastException",
            format!("{} has an unexpected payload", this.class_name()),
        )
    })
}

fn arg_long(args: &[Value], idx: usize, method: &str) -> Result<i64, VncError> {
    match args.get(idx) {
        Some(value) => number::to_long(value),
        None => Err(VncError::arity(format!("{}: missing argument {}", method, idx + 1))),
    }
}

fn arg_index(args: &[Value], idx: usize, method: &str) -> Result<usize, VncError> {
    let n = arg_long(args, idx, method)?;
    usize::try_from(n)
        .map_err(|_| VncError::index_out_of_bounds(format!("{}: negative index {}", method, n)))
}

fn arg_str<'a>(args: &'a [Value], idx: usize, method: &str) -> Result<&'a str, VncError> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(VncError::illegal_argument(format!(
            "{}: expected a string, got {}",
            method,
            other.type_name()
        ))),
        None => Err(VncError::arity(format!("{}: missing argument {}", method, idx + 1))),
    }
}

fn out_of_bounds(idx: usize, len: usize) -> VncError {
    VncError::index_out_of_bounds(format!("Index {} out of bounds for length {}", idx, len))
}

pub struct PrintStreamData {
    writer: SharedWriter,
}

impl PrintStreamData {
    fn write_text(&self, text: &str) -> Result<(), VncError> {
        let mut writer = lock(&*self.writer);
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn flush(&self) -> Result<(), VncError> {
        lock(&*self.writer).flush()?;
        Ok(())
    }
}

impl HostData for PrintStreamData {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn print_stream(writer: SharedWriter) -> Value {
    Value::Host(HostObject::new(PRINT_STREAM, PrintStreamData { writer }))
}

#[derive(Default)]
pub struct StringWriterData {
    text: Mutex<String>,
}

impl HostData for StringWriterData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> Option<String> {
        Some(lock(&self.text).clone())
    }
}

pub fn string_writer() -> Value {
    Value::Host(HostObject::new(STRING_WRITER, StringWriterData::default()))
}

pub struct BufferedReaderData {
    reader: SharedReader,
}

impl BufferedReaderData {
    fn read_line(&self) -> Result<Value, VncError> {
        let mut line = String::new();
        let n = lock(&*self.reader).read_line(&mut line)?;
        if n == 0 {
            return Ok(Value::Nil);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Value::string(line))
    }
}

impl HostData for BufferedReaderData {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn buffered_reader(reader: SharedReader) -> Value {
    Value::Host(HostObject::new(BUFFERED_READER, BufferedReaderData { reader }))
}

/// Writes to whatever `*out*`/`*err*` is bound to.
pub fn write_text(sink: &Value, text: &str) -> Result<(), VncError> {
    match sink {
        Value::Host(obj) => {
            if let Some(stream) = obj.downcast::<PrintStreamData>() {
                return stream.write_text(text);
            }
            if let Some(writer) = obj.downcast::<StringWriterData>() {
                lock(&writer.text).push_str(text);
                return Ok(());
            }
            if let Some(builder) = obj.downcast::<StringBuilderData>() {
                lock(&builder.text).push_str(text);
                return Ok(());
            }
            Err(VncError::runtime(format!(
                "Cannot write to a {}",
                obj.class_name()
            )))
        }
        Value::Nil => Ok(()),
        other => Err(VncError::type_mismatch("output stream", other.type_name())),
    }
}

pub fn flush_sink(sink: &Value) -> Result<(), VncError> {
    match sink {
        Value::Host(obj) => match obj.downcast::<PrintStreamData>() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Reads one line from whatever `*in*` is bound to; nil at end of input.
pub fn read_line(source: &Value) -> Result<Value, VncError> {
    match source {
        Value::Host(obj) => match obj.downcast::<BufferedReaderData>() {
            Some(reader) => reader.read_line(),
            None => Err(VncError::runtime(format!(
                "Cannot read from a {}",
                obj.class_name()
            ))),
        },
        Value::Nil => Ok(Value::Nil),
        other => Err(VncError::type_mismatch("reader", other.type_name())),
    }
}

#[derive(Default)]
pub struct StringBuilderData {
    text: Mutex<String>,
}

impl HostData for StringBuilderData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> Option<String> {
        Some(lock(&self.text).clone())
    }
}

#[derive(Default)]
pub struct ArrayListData {
    items: Mutex<Vec<Value>>,
}

impl ArrayListData {
    fn snapshot(&self) -> Vec<Value> {
        lock(&self.items).clone()
    }
}

impl HostData for ArrayListData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> Option<String> {
        let items: Vec<String> = self.snapshot().iter().map(Value::to_string).collect();
        Some(format!("[{}]", items.join(", ")))
    }
}

#[derive(Default)]
pub struct HashMapData {
    entries: Mutex<StdHashMap<Value, Value>>,
}

impl HashMapData {
    fn snapshot(&self) -> Vec<(Value, Value)> {
        let mut entries: Vec<(Value, Value)> = lock(&self.entries)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }
}

impl HostData for HashMapData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> Option<String> {
        let entries: Vec<String> = self
            .snapshot()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        Some(format!("{{{}}}", entries.join(", ")))
    }
}

pub struct ThreadData {
    runnable: Value,
    name: String,
    stack_size: usize,
    handle: Mutex<Option<JoinHandle<Result<Value, VncError>>>>,
}

impl HostData for ThreadData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> Option<String> {
        Some(format!("Thread[{}]", self.name))
    }
}

impl ThreadData {
    fn start(&self) -> Result<(), VncError> {
        let mut slot = lock(&self.handle);
        if slot.is_some() {
            return Err(VncError::illegal_state(format!(
                "Thread {} has already been started",
                self.name
            )));
        }
        let runnable = self.runnable.clone();
        let ctx = RuntimeCtx::current_handle();
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .stack_size(self.stack_size)
            .spawn(move || match ctx {
                Some(ctx) => ctx.with_current_ctx(|_| call_callable(&runnable, &[])),
                None => call_callable(&runnable, &[]),
            })?;
        tracing::debug!(thread = self.name.as_str(), "host thread started");
        *slot = Some(handle);
        Ok(())
    }

    fn join(&self) -> Result<(), VncError> {
        let handle = lock(&self.handle).take();
        match handle {
            Some(handle) => match handle.join() {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(VncError::runtime(format!("Thread {} panicked", self.name))),
            },
            None => Ok(()),
        }
    }

    fn is_alive(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

static THREAD_COUNTER: Lazy<Mutex<usize>> = Lazy::new(|| Mutex::new(0));

fn next_thread_name() -> String {
    let mut counter = lock(&*THREAD_COUNTER);
    *counter += 1;
    format!("venice-thread-{}", *counter)
}

fn math_unary(args: &[Value], method: &str, f: fn(f64) -> f64) -> Result<Value, VncError> {
    expect_host_args(method, args, 1, 1)?;
    Ok(Value::Double(f(number::to_f64(&args[0])?)))
}

fn math_class() -> HostClass {
    HostClass::builder("java.lang.Math")
        .static_field("PI", Value::Double(std::f64::consts::PI))
        .static_field("E", Value::Double(std::f64::consts::E))
        .static_method("abs", |args| {
            expect_host_args("abs", args, 1, 1)?;
            number::abs(&args[0])
        })
        .static_method("max", |args| {
            expect_host_args("max", args, 2, 2)?;
            Ok(match number::compare(&args[0], &args[1])? {
                Some(std::cmp::Ordering::Less) => args[1].clone(),
                _ => args[0].clone(),
            })
        })
        .static_method("min", |args| {
            expect_host_args("min", args, 2, 2)?;
            Ok(match number::compare(&args[0], &args[1])? {
                Some(std::cmp::Ordering::Greater) => args[1].clone(),
                _ => args[0].clone(),
            })
        })
        .static_method("pow", |args| {
            expect_host_args("pow", args, 2, 2)?;
            Ok(Value::Double(
                number::to_f64(&args[0])?.powf(number::to_f64(&args[1])?),
            ))
        })
        .static_method("round", |args| {
            expect_host_args("round", args, 1, 1)?;
            Ok(Value::Long(number::to_f64(&args[0])?.round() as i64))
        })
        .static_method("random", |args| {
            expect_host_args("random", args, 0, 0)?;
            Ok(Value::Double(pseudo_random()))
        })
        .static_method("sqrt", |args| math_unary(args, "sqrt", f64::sqrt))
        .static_method("floor", |args| math_unary(args, "floor", f64::floor))
        .static_method("ceil", |args| math_unary(args, "ceil", f64::ceil))
        .static_method("sin", |args| math_unary(args, "sin", f64::sin))
        .static_method("cos", |args| math_unary(args, "cos", f64::cos))
        .static_method("tan", |args| math_unary(args, "tan", f64::tan))
        .static_method("log", |args| math_unary(args, "log", f64::ln))
        .static_method("log10", |args| math_unary(args, "log10", f64::log10))
        .static_method("exp", |args| math_unary(args, "exp", f64::exp))
        .build()
}

/// xorshift seeded from the clock; good enough for `Math.random`.
fn pseudo_random() -> f64 {
    static STATE: Lazy<Mutex<u64>> = Lazy::new(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Mutex::new(seed | 1)
    });
    let mut state = lock(&*STATE);
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    (x >> 11) as f64 / (1u64 << 53) as f64
}

fn system_class(unlimited_access: bool) -> HostClass {
    HostClass::builder("java.lang.System")
        .static_method("currentTimeMillis", |args| {
            expect_host_args("currentTimeMillis", args, 0, 0)?;
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            Ok(Value::Long(millis))
        })
        .static_method("nanoTime", |args| {
            expect_host_args("nanoTime", args, 0, 0)?;
            Ok(Value::Long(START.elapsed().as_nanos() as i64))
        })
        .static_method("lineSeparator", |_| Ok(Value::string("\n")))
        .static_method("getProperty", |args| {
            expect_host_args("getProperty", args, 1, 2)?;
            let key = arg_str(args, 0, "getProperty")?;
            let value = match key {
                "line.separator" => Some("\n".to_string()),
                "os.name" => Some(std::env::consts::OS.to_string()),
                "os.arch" => Some(std::env::consts::ARCH.to_string()),
                "file.separator" => Some(std::path::MAIN_SEPARATOR.to_string()),
                _ => None,
            };
            Ok(value
                .map(Value::string)
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Nil)))
        })
        .static_method("getenv", move |args| {
            expect_host_args("getenv", args, 1, 1)?;
            if !unlimited_access {
                return Err(VncError::host(
                    "SecurityException",
                    "Access to environment variables is not permitted",
                ));
            }
            let name = arg_str(args, 0, "getenv")?;
            Ok(std::env::var(name).map(Value::string).unwrap_or(Value::Nil))
        })
        .build()
}

fn long_class() -> HostClass {
    HostClass::builder("java.lang.Long")
        .implements("java.lang.Number")
        .static_field("MAX_VALUE", Value::Long(i64::MAX))
        .static_field("MIN_VALUE", Value::Long(i64::MIN))
        .static_method("parseLong", |args| {
            expect_host_args("parseLong", args, 1, 2)?;
            let text = arg_str(args, 0, "parseLong")?;
            let radix = match args.get(1) {
                Some(r) => u32::try_from(number::to_long(r)?)
                    .map_err(|_| VncError::illegal_argument("parseLong: invalid radix"))?,
                None => 10,
            };
            i64::from_str_radix(text.trim(), radix)
                .map(Value::Long)
                .map_err(|_| {
                    VncError::host(
                        "NumberFormatException",
                        format!("For input string: \"{}\"", text),
                    )
                })
        })
        .static_method("valueOf", |args| {
            expect_host_args("valueOf", args, 1, 1)?;
            match &args[0] {
                Value::String(s) => s.trim().parse::<i64>().map(Value::Long).map_err(|_| {
                    VncError::host("NumberFormatException", format!("For input string: \"{}\"", s))
                }),
                other => number::to_long(other).map(Value::Long),
            }
        })
        .static_method("toHexString", |args| {
            Ok(Value::string(format!("{:x}", arg_long(args, 0, "toHexString")?)))
        })
        .static_method("toBinaryString", |args| {
            Ok(Value::string(format!("{:b}", arg_long(args, 0, "toBinaryString")?)))
        })
        .build()
}

fn string_class() -> HostClass {
    HostClass::builder("java.lang.String")
        .implements("java.lang.CharSequence")
        .static_method("valueOf", |args| {
            expect_host_args("valueOf", args, 1, 1)?;
            Ok(Value::string(args[0].to_str_text()))
        })
        .static_method("join", |args| {
            expect_host_args("join", args, 2, 2)?;
            let sep = arg_str(args, 0, "join")?;
            let parts: Vec<String> = seq_items(&args[1])?.iter().map(Value::to_str_text).collect();
            Ok(Value::string(parts.join(sep)))
        })
        .build()
}

/// Instance methods callable on script strings via `(. "abc" :toUpperCase)`.
pub fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, VncError> {
    let chars = || s.chars().collect::<Vec<char>>();
    match method {
        "length" => Ok(Value::Long(s.chars().count() as i64)),
        "isEmpty" => Ok(Value::Bool(s.is_empty())),
        "toUpperCase" => Ok(Value::string(s.to_uppercase())),
        "toLowerCase" => Ok(Value::string(s.to_lowercase())),
        "trim" => Ok(Value::string(s.trim())),
        "toString" => Ok(Value::string(s)),
        "charAt" => {
            let idx = arg_index(args, 0, "charAt")?;
            let chars = chars();
            chars
                .get(idx)
                .map(|c| Value::Char(*c))
                .ok_or_else(|| out_of_bounds(idx, chars.len()))
        }
        "substring" => {
            expect_host_args("substring", args, 1, 2)?;
            let chars = chars();
            let start = arg_index(args, 0, "substring")?;
            let end = match args.get(1) {
                Some(_) => arg_index(args, 1, "substring")?,
                None => chars.len(),
            };
            if start > end || end > chars.len() {
                return Err(out_of_bounds(end.max(start), chars.len()));
            }
            Ok(Value::string(chars[start..end].iter().collect::<String>()))
        }
        "indexOf" => {
            let needle = arg_str(args, 0, "indexOf")?;
            Ok(Value::Long(
                s.find(needle)
                    .map(|byte_idx| s[..byte_idx].chars().count() as i64)
                    .unwrap_or(-1),
            ))
        }
        "contains" => Ok(Value::Bool(s.contains(arg_str(args, 0, "contains")?))),
        "startsWith" => Ok(Value::Bool(s.starts_with(arg_str(args, 0, "startsWith")?))),
        "endsWith" => Ok(Value::Bool(s.ends_with(arg_str(args, 0, "endsWith")?))),
        "equals" => Ok(Value::Bool(args.first().and_then(Value::as_str) == Some(s))),
        "equalsIgnoreCase" => Ok(Value::Bool(
            args.first()
                .and_then(Value::as_str)
                .map(|other| other.to_lowercase() == s.to_lowercase())
                .unwrap_or(false),
        )),
        "concat" => Ok(Value::string(format!("{}{}", s, arg_str(args, 0, "concat")?))),
        "replace" => {
            expect_host_args("replace", args, 2, 2)?;
            let from = args[0].to_str_text();
            let to = args[1].to_str_text();
            Ok(Value::string(s.replace(&from, &to)))
        }
        "split" => {
            let pattern = arg_str(args, 0, "split")?;
            let re = Regex::new(pattern)
                .map_err(|err| VncError::illegal_argument(format!("split: {}", err)))?;
            let mut parts: Vec<&str> = re.split(s).collect();
            while parts.last() == Some(&"") {
                parts.pop();
            }
            Ok(Value::vector(parts.into_iter().map(Value::string)))
        }
        "repeat" => {
            let count = arg_index(args, 0, "repeat")?;
            Ok(Value::string(s.repeat(count)))
        }
        "compareTo" => {
            let other = arg_str(args, 0, "compareTo")?;
            Ok(Value::Long(match s.cmp(other) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }))
        }
        "toCharArray" => Ok(Value::vector(s.chars().map(Value::Char))),
        _ => Err(VncError::runtime(format!(
            "No method or field '{}' on class java.lang.String",
            method
        ))),
    }
}

fn string_builder_class() -> HostClass {
    HostClass::builder(STRING_BUILDER)
        .implements("java.lang.CharSequence")
        .constructor(|args| {
            expect_host_args("StringBuilder", args, 0, 1)?;
            let builder = StringBuilderData::default();
            if let Some(initial) = args.first() {
                if !initial.is_number() {
                    lock(&builder.text).push_str(&initial.to_str_text());
                }
            }
            Ok(Value::Host(HostObject::new(STRING_BUILDER, builder)))
        })
        .method("append", |this, args| {
            expect_host_args("append", args, 1, 1)?;
            lock(&data::<StringBuilderData>(this)?.text).push_str(&args[0].to_str_text());
            Ok(Value::Host(this.clone()))
        })
        .method("insert", |this, args| {
            expect_host_args("insert", args, 2, 2)?;
            let idx = arg_index(args, 0, "insert")?;
            let builder = data::<StringBuilderData>(this)?;
            let mut text = lock(&builder.text);
            let mut chars: Vec<char> = text.chars().collect();
            if idx > chars.len() {
                return Err(out_of_bounds(idx, chars.len()));
            }
            let inserted: Vec<char> = args[1].to_str_text().chars().collect();
            chars.splice(idx..idx, inserted);
            *text = chars.into_iter().collect();
            drop(text);
            Ok(Value::Host(this.clone()))
        })
        .method("reverse", |this, _| {
            let builder = data::<StringBuilderData>(this)?;
            let mut text = lock(&builder.text);
            *text = text.chars().rev().collect();
            drop(text);
            Ok(Value::Host(this.clone()))
        })
        .method("length", |this, _| {
            Ok(Value::Long(
                lock(&data::<StringBuilderData>(this)?.text).chars().count() as i64,
            ))
        })
        .method("setLength", |this, args| {
            let len = arg_index(args, 0, "setLength")?;
            let builder = data::<StringBuilderData>(this)?;
            let mut text = lock(&builder.text);
            let mut chars: Vec<char> = text.chars().collect();
            chars.resize(len, '\0');
            *text = chars.into_iter().collect();
            Ok(Value::Nil)
        })
        .method("toString", |this, _| {
            Ok(Value::string(lock(&data::<StringBuilderData>(this)?.text).as_str()))
        })
        .build()
}

fn string_writer_class() -> HostClass {
    HostClass::builder(STRING_WRITER)
        .implements("java.io.Writer")
        .constructor(|args| {
            expect_host_args("StringWriter", args, 0, 0)?;
            Ok(string_writer())
        })
        .method("write", |this, args| {
            expect_host_args("write", args, 1, 1)?;
            lock(&data::<StringWriterData>(this)?.text).push_str(&args[0].to_str_text());
            Ok(Value::Nil)
        })
        .method("append", |this, args| {
            expect_host_args("append", args, 1, 1)?;
            lock(&data::<StringWriterData>(this)?.text).push_str(&args[0].to_str_text());
            Ok(Value::Host(this.clone()))
        })
        .method("flush", |_, _| Ok(Value::Nil))
        .method("toString", |this, _| {
            Ok(Value::string(lock(&data::<StringWriterData>(this)?.text).as_str()))
        })
        .build()
}

fn print_stream_class() -> HostClass {
    HostClass::builder(PRINT_STREAM)
        .method("print", |this, args| {
            expect_host_args("print", args, 1, 1)?;
            data::<PrintStreamData>(this)?.write_text(&args[0].to_str_text())?;
            Ok(Value::Nil)
        })
        .method("println", |this, args| {
            expect_host_args("println", args, 0, 1)?;
            let mut text = args.first().map(Value::to_str_text).unwrap_or_default();
            text.push('\n');
            data::<PrintStreamData>(this)?.write_text(&text)?;
            Ok(Value::Nil)
        })
        .method("flush", |this, _| {
            data::<PrintStreamData>(this)?.flush()?;
            Ok(Value::Nil)
        })
        .build()
}

fn buffered_reader_class() -> HostClass {
    HostClass::builder(BUFFERED_READER)
        .implements("java.io.Reader")
        .constructor(|args| {
            expect_host_args("BufferedReader", args, 1, 1)?;
            let text = args[0].to_str_text();
            let reader: SharedReader =
                std::sync::Arc::new(Mutex::new(std::io::Cursor::new(text.into_bytes())));
            Ok(buffered_reader(reader))
        })
        .method("readLine", |this, _| data::<BufferedReaderData>(this)?.read_line())
        .method("lines", |this, _| {
            let reader = data::<BufferedReaderData>(this)?;
            let mut lines = Vec::new();
            loop {
                match reader.read_line()? {
                    Value::Nil => break,
                    line => lines.push(line),
                }
            }
            Ok(Value::list(lines))
        })
        .build()
}

fn array_list_class() -> HostClass {
    HostClass::builder(ARRAY_LIST)
        .implements("java.util.List")
        .implements("java.util.Collection")
        .implements("java.lang.Iterable")
        .constructor(|args| {
            expect_host_args("ArrayList", args, 0, 1)?;
            let list = ArrayListData::default();
            if let Some(initial) = args.first() {
                if !initial.is_number() {
                    *lock(&list.items) = seq_items(initial)?;
                }
            }
            Ok(Value::Host(HostObject::new(ARRAY_LIST, list)))
        })
        .method("add", |this, args| {
            expect_host_args("add", args, 1, 2)?;
            let list = data::<ArrayListData>(this)?;
            let mut items = lock(&list.items);
            if args.len() == 2 {
                let idx = arg_index(args, 0, "add")?;
                if idx > items.len() {
                    return Err(out_of_bounds(idx, items.len()));
                }
                items.insert(idx, args[1].clone());
                return Ok(Value::Nil);
            }
            items.push(args[0].clone());
            Ok(Value::Bool(true))
        })
        .method("get", |this, args| {
            let idx = arg_index(args, 0, "get")?;
            let items = lock(&data::<ArrayListData>(this)?.items);
            items.get(idx).cloned().ok_or_else(|| out_of_bounds(idx, items.len()))
        })
        .method("set", |this, args| {
            expect_host_args("set", args, 2, 2)?;
            let idx = arg_index(args, 0, "set")?;
            let mut items = lock(&data::<ArrayListData>(this)?.items);
            let len = items.len();
            let slot = items.get_mut(idx).ok_or_else(|| out_of_bounds(idx, len))?;
            Ok(std::mem::replace(slot, args[1].clone()))
        })
        .method("remove", |this, args| {
            let idx = arg_index(args, 0, "remove")?;
            let mut items = lock(&data::<ArrayListData>(this)?.items);
            if idx >= items.len() {
                return Err(out_of_bounds(idx, items.len()));
            }
            Ok(items.remove(idx))
        })
        .method("size", |this, _| {
            Ok(Value::Long(lock(&data::<ArrayListData>(this)?.items).len() as i64))
        })
        .method("isEmpty", |this, _| {
            Ok(Value::Bool(lock(&data::<ArrayListData>(this)?.items).is_empty()))
        })
        .method("contains", |this, args| {
            expect_host_args("contains", args, 1, 1)?;
            Ok(Value::Bool(
                lock(&data::<ArrayListData>(this)?.items).contains(&args[0]),
            ))
        })
        .method("indexOf", |this, args| {
            expect_host_args("indexOf", args, 1, 1)?;
            let items = lock(&data::<ArrayListData>(this)?.items);
            Ok(Value::Long(
                items
                    .iter()
                    .position(|v| v == &args[0])
                    .map(|i| i as i64)
                    .unwrap_or(-1),
            ))
        })
        .method("clear", |this, _| {
            lock(&data::<ArrayListData>(this)?.items).clear();
            Ok(Value::Nil)
        })
        .method("forEach", |this, args| {
            expect_host_args("forEach", args, 1, 1)?;
            for item in data::<ArrayListData>(this)?.snapshot() {
                call_callable(&args[0], &[item])?;
            }
            Ok(Value::Nil)
        })
        .method("removeIf", |this, args| {
            expect_host_args("removeIf", args, 1, 1)?;
            let list = data::<ArrayListData>(this)?;
            let mut kept = Vec::new();
            let mut removed = false;
            for item in list.snapshot() {
                if call_callable(&args[0], &[item.clone()])?.is_truthy() {
                    removed = true;
                } else {
                    kept.push(item);
                }
            }
            *lock(&list.items) = kept;
            Ok(Value::Bool(removed))
        })
        .method("replaceAll", |this, args| {
            expect_host_args("replaceAll", args, 1, 1)?;
            let list = data::<ArrayListData>(this)?;
            let mut replaced = Vec::new();
            for item in list.snapshot() {
                replaced.push(call_callable(&args[0], &[item])?);
            }
            *lock(&list.items) = replaced;
            Ok(Value::Nil)
        })
        .method("toArray", |this, _| {
            Ok(Value::vector(data::<ArrayListData>(this)?.snapshot()))
        })
        .build()
}

fn hash_map_class() -> HostClass {
    HostClass::builder(HASH_MAP)
        .implements("java.util.Map")
        .constructor(|args| {
            expect_host_args("HashMap", args, 0, 1)?;
            let map = HashMapData::default();
            if let Some(initial) = args.first() {
                let entries = initial.map_entries().ok_or_else(|| {
                    VncError::type_mismatch("map", initial.type_name())
                })?;
                lock(&map.entries).extend(entries);
            }
            Ok(Value::Host(HostObject::new(HASH_MAP, map)))
        })
        .method("put", |this, args| {
            expect_host_args("put", args, 2, 2)?;
            let previous = lock(&data::<HashMapData>(this)?.entries)
                .insert(args[0].clone(), args[1].clone());
            Ok(previous.unwrap_or(Value::Nil))
        })
        .method("get", |this, args| {
            expect_host_args("get", args, 1, 1)?;
            Ok(lock(&data::<HashMapData>(this)?.entries)
                .get(&args[0])
                .cloned()
                .unwrap_or(Value::Nil))
        })
        .method("getOrDefault", |this, args| {
            expect_host_args("getOrDefault", args, 2, 2)?;
            Ok(lock(&data::<HashMapData>(this)?.entries)
                .get(&args[0])
                .cloned()
                .unwrap_or_else(|| args[1].clone()))
        })
        .method("containsKey", |this, args| {
            expect_host_args("containsKey", args, 1, 1)?;
            Ok(Value::Bool(
                lock(&data::<HashMapData>(this)?.entries).contains_key(&args[0]),
            ))
        })
        .method("remove", |this, args| {
            expect_host_args("remove", args, 1, 1)?;
            Ok(lock(&data::<HashMapData>(this)?.entries)
                .remove(&args[0])
                .unwrap_or(Value::Nil))
        })
        .method("size", |this, _| {
            Ok(Value::Long(lock(&data::<HashMapData>(this)?.entries).len() as i64))
        })
        .method("isEmpty", |this, _| {
            Ok(Value::Bool(lock(&data::<HashMapData>(this)?.entries).is_empty()))
        })
        .method("clear", |this, _| {
            lock(&data::<HashMapData>(this)?.entries).clear();
            Ok(Value::Nil)
        })
        .method("keySet", |this, _| {
            Ok(Value::Set(
                data::<HashMapData>(this)?.snapshot().into_iter().map(|(k, _)| k).collect(),
            ))
        })
        .method("values", |this, _| {
            Ok(Value::list(
                data::<HashMapData>(this)?.snapshot().into_iter().map(|(_, v)| v),
            ))
        })
        .method("compute", |this, args| {
            expect_host_args("compute", args, 2, 2)?;
            let map = data::<HashMapData>(this)?;
            let current = lock(&map.entries).get(&args[0]).cloned().unwrap_or(Value::Nil);
            let next = call_callable(&args[1], &[args[0].clone(), current])?;
            let mut entries = lock(&map.entries);
            if next.is_nil() {
                entries.remove(&args[0]);
            } else {
                entries.insert(args[0].clone(), next.clone());
            }
            Ok(next)
        })
        .method("computeIfAbsent", |this, args| {
            expect_host_args("computeIfAbsent", args, 2, 2)?;
            let map = data::<HashMapData>(this)?;
            if let Some(existing) = lock(&map.entries).get(&args[0]).cloned() {
                return Ok(existing);
            }
            let created = call_callable(&args[1], &[args[0].clone()])?;
            if !created.is_nil() {
                lock(&map.entries).insert(args[0].clone(), created.clone());
            }
            Ok(created)
        })
        .method("forEach", |this, args| {
            expect_host_args("forEach", args, 1, 1)?;
            for (k, v) in data::<HashMapData>(this)?.snapshot() {
                call_callable(&args[0], &[k, v])?;
            }
            Ok(Value::Nil)
        })
        .method("toMap", |this, _| {
            Ok(Value::Map(data::<HashMapData>(this)?.snapshot().into_iter().collect()))
        })
        .build()
}

fn thread_class(stack_size: usize) -> HostClass {
    HostClass::builder(THREAD)
        .implements("java.lang.Runnable")
        .constructor(move |args| {
            expect_host_args("Thread", args, 1, 2)?;
            let runnable = args[0].clone();
            let callable = runnable.is_callable()
                || matches!(&runnable, Value::Host(obj) if obj.is_functional());
            if !callable {
                return Err(VncError::type_mismatch("java.lang.Runnable", runnable.type_name()));
            }
            let name = match args.get(1) {
                Some(name) => name.to_str_text(),
                None => next_thread_name(),
            };
            Ok(Value::Host(HostObject::new(
                THREAD,
                ThreadData {
                    runnable,
                    name,
                    stack_size,
                    handle: Mutex::new(None),
                },
            )))
        })
        .method("start", |this, _| {
            data::<ThreadData>(this)?.start()?;
            Ok(Value::Nil)
        })
        .method("join", |this, _| {
            data::<ThreadData>(this)?.join()?;
            Ok(Value::Nil)
        })
        .method("isAlive", |this, _| Ok(Value::Bool(data::<ThreadData>(this)?.is_alive())))
        .method("getName", |this, _| Ok(Value::string(&data::<ThreadData>(this)?.name)))
        .static_method("sleep", |args| {
            let millis = arg_long(args, 0, "sleep")?.max(0) as u64;
            std::thread::sleep(Duration::from_millis(millis));
            Ok(Value::Nil)
        })
        .build()
}

/// Registers the classes every interpreter starts with.
pub fn install(registry: &HostRegistry, options: &VeniceOptions) {
    registry.register(math_class());
    registry.register(system_class(options.unlimited_access));
    registry.register(long_class());
    registry.register(string_class());
    registry.register(string_builder_class());
    registry.register(string_writer_class());
    registry.register(print_stream_class());
    registry.register(buffered_reader_class());
    registry.register(array_list_class());
    registry.register(hash_map_class());
    registry.register(thread_class(options.stack_size));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_methods_count_code_points() {
        assert_eq!(string_method("héllo", "length", &[]).unwrap(), Value::Long(5));
        assert_eq!(
            string_method("héllo", "substring", &[Value::Long(1), Value::Long(3)]).unwrap(),
            Value::string("él")
        );
        assert_eq!(
            string_method("a,b,,", "split", &[Value::string(",")]).unwrap(),
            Value::vector(vec![Value::string("a"), Value::string("b")])
        );
    }

    #[test]
    fn writers_collect_text() {
        let writer = string_writer();
        write_text(&writer, "abc").unwrap();
        write_text(&writer, "def").unwrap();
        assert_eq!(writer.to_string(), "abcdef");
    }

    #[test]
    fn registry_holds_builtin_classes() {
        let registry = HostRegistry::new();
        install(&registry, &VeniceOptions::default());
        assert_eq!(registry.resolve("Math").as_deref(), Some("java.lang.Math"));
        assert!(registry.contains(ARRAY_LIST));
        assert!(registry.resolve("ArrayList").is_none());
    }
}
