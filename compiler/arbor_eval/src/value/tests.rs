use std::cmp::Ordering;

use pretty_assertions::assert_eq;

use arbor_ir::TypeId;

use super::Value;

#[test]
fn records_compare_by_fields() {
    let a = Value::object(TypeId::OBJECT, vec![Value::Int(1), Value::string("a")]);
    let b = Value::object(TypeId::OBJECT, vec![Value::Int(1), Value::string("a")]);
    let c = Value::object(TypeId::OBJECT, vec![Value::Int(2), Value::string("a")]);
    assert!(a.equals(&b));
    assert!(!a.equals(&c));
    assert_eq!(a.compare(&c), Ordering::Less);
}

#[test]
fn lists_compare_by_identity() {
    let a = Value::list(TypeId::OBJECT, vec![Value::Int(1)]);
    let b = Value::list(TypeId::OBJECT, vec![Value::Int(1)]);
    assert!(!a.equals(&b));
    assert!(a.equals(&a.clone()));
}

#[test]
fn null_sorts_first_and_has_no_type() {
    assert_eq!(Value::Null.compare(&Value::Int(-5)), Ordering::Less);
    assert_eq!(Value::Null.runtime_type(), None);
    assert_eq!(Value::Int(3).runtime_type(), Some(TypeId::INT));
}

#[test]
fn mixed_numbers_compare_numerically() {
    assert!(Value::Int(2).equals(&Value::Float(2.0)));
    assert_eq!(Value::Float(1.5).compare(&Value::Int(2)), Ordering::Less);
    assert_eq!(Value::list(TypeId::OBJECT, Vec::new()).as_items().unwrap(), Vec::new());
}
