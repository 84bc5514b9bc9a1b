use uuid::Uuid;

const CONSONANTS: [char; 20] = [
	'b', 'c', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'm', 'n', 'p', 'r', 's', 't', 'v', 'w', 'x', 'y', 'z',
];
const VOWELS: [char; 5] = ['a', 'e', 'i', 'o', 'u'];
const SYLLABLES: u128 = (CONSONANTS.len() * VOWELS.len()) as u128;
const LENGTH: usize = 4;

/// Pronounceable name derived from `uuid`: four syllables out of a
/// hundred-syllable table.
pub(crate) fn mnemonic(uuid: Uuid) -> String {
	let mut bits = uuid.as_u128();
	let mut name = String::with_capacity(LENGTH * 2);
	for _ in 0..LENGTH {
		let syllable = (bits % SYLLABLES) as usize;
		bits /= SYLLABLES;
		name.push(CONSONANTS[syllable / VOWELS.len()]);
		name.push(VOWELS[syllable % VOWELS.len()]);
	}
	name
}
