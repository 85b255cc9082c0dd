use lazy_static::lazy_static;
use rand::{rngs::StdRng, Rng, SeedableRng};
use regex::Regex;

/// Style vocabulary drawn from when a base prompt has no explicit variants.
pub const STYLES: &[&str] = &[
	"cyberpunk",
	"watercolor",
	"low-poly",
	"surreal",
	"pixel art",
	"oil painting",
	"abstract",
	"vaporwave",
	"isometric",
];

/// Separator between explicitly enumerated variants.
pub const EXPLICIT_SEP: &str = "||";

/// Upper bound on the prompts one template may expand into.
pub const MAX_EXPANSIONS: usize = 10_000;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PromptError {
	#[error("template expands to more than {} prompts", MAX_EXPANSIONS)]
	TooManyCombinations,
}

lazy_static! {
	// Non-nested `{a|b|c}` alternation groups. Empty braces are not a group.
	static ref GROUP_RE: Regex = Regex::new(r"\{([^{}]+)\}").unwrap();
}

/// Produces `count` base prompts from `base`, seeding a fresh RNG from `seed`
/// (or from the OS when absent).
pub fn generate_variants(base: &str, count: usize, seed: Option<u64>) -> Vec<String> {
	let mut rng = match seed {
		Some(s) => StdRng::seed_from_u64(s),
		None => StdRng::from_os_rng(),
	};
	generate_variants_with(base, count, &mut rng)
}

/// Same as [`generate_variants`] but draws styles from a caller-supplied RNG.
///
/// With `||` in `base` the explicit entries are used (truncated, or padded
/// with the last one) and the RNG is never touched. Otherwise the first
/// variant is the trimmed base and every further one gets a random
/// ` --style <S>` suffix.
pub fn generate_variants_with<R: Rng>(base: &str, count: usize, rng: &mut R) -> Vec<String> {
	let count = count.max(1);

	if base.contains(EXPLICIT_SEP) {
		let mut out: Vec<String> = base
			.split(EXPLICIT_SEP)
			.map(|p| p.trim().to_string())
			.take(count)
			.collect();
		// split always yields at least one element, so `last` exists
		if let Some(last) = out.last().cloned() {
			out.resize(count, last);
		}
		return out;
	}

	let trimmed = base.trim();
	let mut out = Vec::with_capacity(count);
	out.push(trimmed.to_string());
	while out.len() < count {
		let style = STYLES[rng.random_range(0..STYLES.len())];
		out.push(format!("{trimmed} --style {style}"));
	}
	out
}

/// Expands every `{a|b}` group in `prompt` into the full Cartesian product.
/// The rightmost group cycles fastest. Never returns an empty list; a product
/// above [`MAX_EXPANSIONS`] is an error.
pub fn expand_template(prompt: &str) -> Result<Vec<String>, PromptError> {
	let groups: Vec<&str> = GROUP_RE
		.captures_iter(prompt)
		.filter_map(|c| c.get(1).map(|m| m.as_str()))
		.collect();
	if groups.is_empty() {
		return Ok(vec![prompt.to_string()]);
	}

	let choices: Vec<Vec<&str>> = groups.iter().map(|g| g.split('|').collect()).collect();
	let total = choices
		.iter()
		.try_fold(1usize, |acc, c| acc.checked_mul(c.len()))
		.filter(|&n| n <= MAX_EXPANSIONS)
		.ok_or(PromptError::TooManyCombinations)?;

	let mut out = Vec::with_capacity(total);
	let mut idx = vec![0usize; choices.len()];
	loop {
		let mut p = prompt.to_string();
		for (g, (group, opts)) in groups.iter().zip(&choices).enumerate() {
			p = p.replacen(&format!("{{{group}}}"), opts[idx[g]], 1);
		}
		out.push(p);

		// Advance counters, least-significant index = last group
		let mut pos = choices.len();
		loop {
			if pos == 0 {
				return Ok(out);
			}
			pos -= 1;
			idx[pos] += 1;
			if idx[pos] < choices[pos].len() {
				break;
			}
			idx[pos] = 0;
		}
	}
}

/// Final submission list: the expansion of each variant, concatenated in order.
pub fn build_prompt_list(
	base: &str,
	count: usize,
	seed: Option<u64>,
) -> Result<Vec<String>, PromptError> {
	let mut out = Vec::new();
	for variant in generate_variants(base, count, seed) {
		out.extend(expand_template(&variant)?);
	}
	Ok(out)
}
