//! Method calls and member reads on runtime values.
//!
//! Host registrations are consulted first, then the built-in runtime surface
//! that reduced trees call into.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use arbor_ir::{Name, TypeData, TypeId};

use super::{Flow, Interpreter};
use crate::errors::{null_reference, type_error, EvalError, EvalResult};
use crate::value::{EnumeratorState, GroupingValue, ListValue, LookupValue, Value};

fn arity(method: &str, expected: usize, args: &[Value]) -> EvalResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(type_error(format!(
            "`{method}` takes {expected} argument(s), {} supplied",
            args.len()
        )))
    }
}

fn row_key(row: &Value, index: usize) -> Value {
    match row {
        Value::Object(object) => object
            .fields
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

impl Interpreter<'_> {
    pub(super) fn call_method(&mut self, receiver: &Value, method: Name, args: &[Value]) -> Flow {
        if let Some(host) = receiver
            .runtime_type()
            .and_then(|ty| self.host.get(ty, method))
        {
            tracing::trace!(method = self.arena.name_str(method), "host method");
            return Ok(host(receiver, args)?);
        }
        let names = self.names;
        let name = self.arena.name_str(method);
        if receiver.is_null() {
            return Err(null_reference(format!("call to `{name}`")).into());
        }
        if method == names.to_str {
            arity(name, 0, args)?;
            return Ok(Value::string(&self.render(receiver)));
        }
        match receiver {
            Value::List(list) if method == names.add => {
                arity(name, 1, args)?;
                list.items.borrow_mut().extend(args.iter().cloned());
                Ok(Value::Unit)
            }
            Value::List(list) if method == names.get_enumerator => {
                let items = list.items.borrow().clone();
                Ok(self.enumerator(list.ty, items))
            }
            Value::List(list) if method == names.sort_by_keys => {
                self.sort_by_keys(list, args)?;
                Ok(Value::Unit)
            }
            Value::Lookup(lookup) if method == names.add => {
                arity(name, 2, args)?;
                Self::lookup_add(lookup, &args[0], &args[1]);
                Ok(Value::Unit)
            }
            Value::Lookup(lookup) if method == names.get_enumerator => {
                let groupings = lookup
                    .groups
                    .borrow()
                    .iter()
                    .map(|(key, items)| {
                        Value::Grouping(Rc::new(GroupingValue {
                            ty: lookup.grouping_ty,
                            key: key.clone(),
                            items: items.clone(),
                        }))
                    })
                    .collect();
                Ok(self.enumerator(lookup.ty, groupings))
            }
            Value::Grouping(grouping) if method == names.get_enumerator => {
                Ok(self.enumerator(grouping.ty, grouping.items.clone()))
            }
            Value::Enumerator(state) if method == names.move_next => {
                let mut state = state.borrow_mut();
                if state.disposed {
                    return Err(EvalError::Enumerator("`move_next` after `dispose`".to_owned()).into());
                }
                let next = state.position.map_or(0, |p| p + 1).min(state.items.len());
                state.position = Some(next);
                Ok(Value::Bool(next < state.items.len()))
            }
            Value::Enumerator(state) if method == names.current => Ok(Self::current(state)?),
            Value::Enumerator(state) if method == names.dispose => {
                state.borrow_mut().disposed = true;
                Ok(Value::Unit)
            }
            other => Err(EvalError::NoSuchMethod {
                receiver: self.describe(other),
                method: name.to_owned(),
            }
            .into()),
        }
    }

    pub(super) fn call_static(&mut self, method: Name, args: &[Value]) -> EvalResult<Value> {
        let names = self.names;
        let name = self.arena.name_str(method);
        if method == names.concat {
            let text: String = args.iter().map(|arg| self.render(arg)).collect();
            return Ok(Value::string(&text));
        }
        if method == names.monitor_enter {
            arity(name, 1, args)?;
            if args[0].is_null() {
                return Err(null_reference("lock on a null reference"));
            }
            self.monitors += 1;
            return Ok(Value::Unit);
        }
        if method == names.monitor_exit {
            arity(name, 1, args)?;
            self.monitors = self
                .monitors
                .checked_sub(1)
                .ok_or_else(|| type_error("`monitor.exit` without a held monitor"))?;
            return Ok(Value::Unit);
        }
        Err(EvalError::NoSuchMethod {
            receiver: "runtime".to_owned(),
            method: name.to_owned(),
        })
    }

    pub(super) fn member(&mut self, receiver: &Value, member: Name) -> Flow {
        let name = self.arena.name_str(member);
        match receiver {
            Value::Null => Err(null_reference(format!("member `{name}`")).into()),
            Value::Object(object) => {
                if let Some(index) = self.field_index(object.ty, member) {
                    return Ok(object
                        .fields
                        .borrow()
                        .get(index)
                        .cloned()
                        .unwrap_or(Value::Null));
                }
                // Properties without storage are host methods taking no arguments.
                match self.host.get(object.ty, member) {
                    Some(host) => Ok(host(receiver, &[])?),
                    None => Err(self.no_member(receiver, member).into()),
                }
            }
            Value::Enumerator(state) if member == self.names.current => Ok(Self::current(state)?),
            Value::Grouping(grouping) if name == "key" => Ok(grouping.key.clone()),
            Value::List(list) if name == "count" => i64::try_from(list.items.borrow().len())
                .map(Value::Int)
                .map_err(|_| EvalError::Overflow { op: "count" }.into()),
            other => Err(self.no_member(other, member).into()),
        }
    }

    pub(super) fn no_member(&self, receiver: &Value, member: Name) -> EvalError {
        EvalError::NoSuchMember {
            receiver: self.describe(receiver),
            member: self.arena.name_str(member).to_owned(),
        }
    }

    fn describe(&self, value: &Value) -> String {
        value.runtime_type().map_or_else(
            || value.kind_name().to_owned(),
            |ty| self.arena.display_type(ty),
        )
    }

    /// Enumerator over a snapshot of `items`, typed from `collection`'s element.
    fn enumerator(&self, collection: TypeId, items: Vec<Value>) -> Value {
        let pool = self.arena.pool();
        let ty = pool
            .element_type(collection)
            .and_then(|element| pool.find(&TypeData::Enumerator(element)))
            .unwrap_or(TypeId::DISPOSABLE);
        Value::Enumerator(Rc::new(RefCell::new(EnumeratorState {
            ty,
            items,
            position: None,
            disposed: false,
        })))
    }

    fn current(state: &RefCell<EnumeratorState>) -> EvalResult<Value> {
        let state = state.borrow();
        state
            .position
            .and_then(|p| state.items.get(p))
            .cloned()
            .ok_or_else(|| EvalError::Enumerator("`current` read outside the sequence".to_owned()))
    }

    fn lookup_add(lookup: &LookupValue, key: &Value, element: &Value) {
        let mut groups = lookup.groups.borrow_mut();
        match groups.iter_mut().find(|(k, _)| k.equals(key)) {
            Some((_, items)) => items.push(element.clone()),
            None => groups.push((key.clone(), vec![element.clone()])),
        }
    }

    /// Stable sort of tuple rows by the fields from `args[0]` on, one
    /// descending flag per key in the remaining arguments.
    fn sort_by_keys(&self, list: &ListValue, args: &[Value]) -> EvalResult<()> {
        let Some((offset, flags)) = args.split_first() else {
            return Err(type_error("`sort_by_keys` needs a key offset"));
        };
        let offset = offset
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| type_error("`sort_by_keys` offset must be a non-negative int"))?;
        let descending = flags
            .iter()
            .map(|flag| {
                flag.as_bool()
                    .ok_or_else(|| type_error("`sort_by_keys` direction flags must be bools"))
            })
            .collect::<EvalResult<Vec<bool>>>()?;
        list.items.borrow_mut().sort_by(|a, b| {
            descending
                .iter()
                .enumerate()
                .map(|(k, &desc)| {
                    let order = row_key(a, offset + k).compare(&row_key(b, offset + k));
                    if desc {
                        order.reverse()
                    } else {
                        order
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        tracing::trace!(keys = descending.len(), "rows sorted");
        Ok(())
    }
}
