//! The people involved in an emergency: the subject who raises it and the
//! contacts who are told about it.
//!
//! Both are owned by the user profile. The workflow only ever reads them and
//! snapshots what it needs onto the incident at activation time.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user who triggers the distress signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: Uuid,
  pub name:       String,
  /// Phone number or e-mail address the responders can reach the subject on.
  pub contact:    String,
}

impl Subject {
  pub fn new(name: impl Into<String>, contact: impl Into<String>) -> Self {
    Self {
      subject_id: Uuid::new_v4(),
      name:       name.into(),
      contact:    contact.into(),
    }
  }
}

/// An emergency contact from the subject's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub contact_id:   Uuid,
  pub name:         String,
  pub phone_number: String,
  /// Lower is contacted first.
  pub priority:     u8,
}

impl Contact {
  pub fn new(
    name: impl Into<String>,
    phone_number: impl Into<String>,
    priority: u8,
  ) -> Self {
    Self {
      contact_id: Uuid::new_v4(),
      name: name.into(),
      phone_number: phone_number.into(),
      priority,
    }
  }
}

/// Order contacts for a fan-out: ascending priority, input order kept
/// between equal priorities, duplicate ids dropped, at most `max` entries.
pub fn prioritized_contacts(contacts: &[Contact], max: usize) -> Vec<Contact> {
  let mut ordered: Vec<&Contact> = contacts.iter().collect();
  ordered.sort_by_key(|c| c.priority);

  let mut seen = HashSet::new();
  ordered
    .into_iter()
    .filter(|c| seen.insert(c.contact_id))
    .take(max)
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn orders_by_priority_and_keeps_ties_stable() {
    let a = Contact::new("Ana", "+34600000001", 2);
    let b = Contact::new("Bruno", "+34600000002", 1);
    let c = Contact::new("Carla", "+34600000003", 2);

    let ordered = prioritized_contacts(&[a.clone(), b.clone(), c.clone()], 5);
    let names: Vec<_> = ordered.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Bruno", "Ana", "Carla"]);
  }

  #[test]
  fn drops_duplicates_and_caps() {
    let a = Contact::new("Ana", "+34600000001", 1);
    let mut contacts = vec![a.clone(), a.clone()];
    for i in 0..6 {
      contacts.push(Contact::new(format!("c{i}"), "+1", 3));
    }

    let ordered = prioritized_contacts(&contacts, 5);
    assert_eq!(ordered.len(), 5);
    assert_eq!(ordered.iter().filter(|c| c.contact_id == a.contact_id).count(), 1);
  }

  #[test]
  fn empty_list_stays_empty() {
    assert!(prioritized_contacts(&[], 5).is_empty());
  }
}
