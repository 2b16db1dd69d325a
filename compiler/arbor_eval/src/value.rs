//! Runtime values.
//!
//! Scalars are stored inline. Collections, records and enumerators are
//! shared through `Rc`, so copying a value aliases the same object the way
//! reference types do in the evaluated language.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use arbor_ir::{NodeId, TypeId, VarId};

use crate::environment::{LocalScope, Scope};

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Type(TypeId),
    /// Arrays and growable lists.
    List(Rc<ListValue>),
    /// Tuples, records, exceptions and plain objects.
    Object(Rc<ObjectValue>),
    Enumerator(Rc<RefCell<EnumeratorState>>),
    Lookup(Rc<LookupValue>),
    Grouping(Rc<GroupingValue>),
    Closure(Rc<Closure>),
}

#[derive(Debug)]
pub struct ListValue {
    pub ty: TypeId,
    pub items: RefCell<Vec<Value>>,
}

#[derive(Debug)]
pub struct ObjectValue {
    pub ty: TypeId,
    pub fields: RefCell<Vec<Value>>,
}

/// Cursor over a snapshot taken when the enumerator was created.
#[derive(Debug)]
pub struct EnumeratorState {
    pub ty: TypeId,
    pub items: Vec<Value>,
    /// `None` before the first `move_next`.
    pub position: Option<usize>,
    pub disposed: bool,
}

/// Insertion-ordered multi-map from key to elements.
#[derive(Debug)]
pub struct LookupValue {
    pub ty: TypeId,
    pub grouping_ty: TypeId,
    pub groups: RefCell<Vec<(Value, Vec<Value>)>>,
}

#[derive(Debug)]
pub struct GroupingValue {
    pub ty: TypeId,
    pub key: Value,
    pub items: Vec<Value>,
}

pub struct Closure {
    pub ty: TypeId,
    pub params: Vec<VarId>,
    pub body: NodeId,
    pub scope: LocalScope<Scope>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn list(ty: TypeId, items: Vec<Value>) -> Self {
        Value::List(Rc::new(ListValue {
            ty,
            items: RefCell::new(items),
        }))
    }

    pub fn object(ty: TypeId, fields: Vec<Value>) -> Self {
        Value::Object(Rc::new(ObjectValue {
            ty,
            fields: RefCell::new(fields),
        }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Elements of a list or array, cloned out.
    pub fn as_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.items.borrow().clone()),
            _ => None,
        }
    }

    /// Dynamic type of a non-null value.
    pub fn runtime_type(&self) -> Option<TypeId> {
        Some(match self {
            Value::Null => return None,
            Value::Unit => TypeId::UNIT,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::Str(_) => TypeId::STR,
            Value::Type(_) => TypeId::TYPE,
            Value::List(list) => list.ty,
            Value::Object(object) => object.ty,
            Value::Enumerator(state) => state.borrow().ty,
            Value::Lookup(lookup) => lookup.ty,
            Value::Grouping(grouping) => grouping.ty,
            Value::Closure(closure) => closure.ty,
        })
    }

    /// Value equality: structural for scalars, tuples and records,
    /// identity for collections, enumerators and closures.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            #[allow(clippy::float_cmp, reason = "language-level float equality")]
            (Value::Float(a), Value::Float(b)) => a == b,
            #[allow(
                clippy::float_cmp,
                clippy::cast_precision_loss,
                reason = "mixed numeric comparison"
            )]
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.ty == b.ty && {
                        let (fa, fb) = (a.fields.borrow(), b.fields.borrow());
                        fa.len() == fb.len() && fa.iter().zip(fb.iter()).all(|(x, y)| x.equals(y))
                    })
            }
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Enumerator(a), Value::Enumerator(b)) => Rc::ptr_eq(a, b),
            (Value::Lookup(a), Value::Lookup(b)) => Rc::ptr_eq(a, b),
            (Value::Grouping(a), Value::Grouping(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering used by comparisons and `sort_by_keys`. Values with no
    /// natural order compare equal.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            #[allow(clippy::cast_precision_loss, reason = "mixed numeric comparison")]
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            #[allow(clippy::cast_precision_loss, reason = "mixed numeric comparison")]
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => {
                let (fa, fb) = (a.fields.borrow(), b.fields.borrow());
                fa.iter()
                    .zip(fb.iter())
                    .map(|(x, y)| x.compare(y))
                    .find(|o| o.is_ne())
                    .unwrap_or_else(|| fa.len().cmp(&fb.len()))
            }
            _ => Ordering::Equal,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Type(_) => "type",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Enumerator(_) => "enumerator",
            Value::Lookup(_) => "lookup",
            Value::Grouping(_) => "grouping",
            Value::Closure(_) => "closure",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
