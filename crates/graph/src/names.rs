use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::mnemonic::mnemonic;

/// Bidirectional uuid to name map with collision suffixing.
#[derive(Debug, Default)]
pub(crate) struct NameRegistry {
	by_uuid: FxHashMap<Uuid, String>,
	by_name: FxHashMap<String, Uuid>,
}

impl NameRegistry {
	pub fn get(&self, uuid: Uuid) -> Option<&str> {
		self.by_uuid.get(&uuid).map(String::as_str)
	}

	pub fn lookup(&self, name: &str) -> Option<Uuid> {
		self.by_name.get(name).copied()
	}

	/// Name of `uuid`, assigning its mnemonic on first request.
	pub fn name_of(&mut self, uuid: Uuid) -> String {
		if let Some(name) = self.by_uuid.get(&uuid) {
			return name.clone();
		}
		self.assign(uuid, &mnemonic(uuid))
	}

	/// Records `proposal` for `uuid`, or the smallest free `proposal_k`.
	///
	/// The previous name of `uuid`, if any, is released first.
	pub fn assign(&mut self, uuid: Uuid, proposal: &str) -> String {
		if self.get(uuid) == Some(proposal) {
			return proposal.to_owned();
		}
		self.release(uuid);

		let name = if self.by_name.contains_key(proposal) {
			(2usize..)
				.map(|k| format!("{proposal}_{k}"))
				.find(|candidate| !self.by_name.contains_key(candidate))
				.unwrap_or_else(|| proposal.to_owned())
		} else {
			proposal.to_owned()
		};

		self.by_name.insert(name.clone(), uuid);
		self.by_uuid.insert(uuid, name.clone());
		name
	}

	pub fn release(&mut self, uuid: Uuid) {
		if let Some(name) = self.by_uuid.remove(&uuid) {
			self.by_name.remove(&name);
		}
	}

	pub fn clear(&mut self) {
		self.by_uuid.clear();
		self.by_name.clear();
	}
}
