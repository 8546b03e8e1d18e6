//! Summarize the range of revisions present in a working copy, and whether it
//! is switched, modified or sparse.
//!
//! Node information is supplied by the caller (e.g. a working-copy database
//! scanner) as an iterator. This crate only folds it into a
//! [`RevisionStatus`].

use tracing::{debug, trace};

/// Revision number.
pub type Revnum = u64;

/// Information about a single node of a working copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
	/// Path of the node.
	pub path: String,
	/// Base revision. `None` for added nodes.
	pub revision: Option<Revnum>,
	/// Repository URL of the node, if known.
	pub url: Option<String>,
	pub text_modified: bool,
	pub props_modified: bool,
	/// Revision node was copied or moved from, if any.
	pub original_revision: Option<Revnum>,
	pub switched: bool,
	/// `false` if node is checked out with depth other than infinity.
	pub depth_infinite: bool,
}

impl NodeInfo {
	/// Revision to use for min/max.
	///
	/// Added nodes have no revision, so use the revision they were copied from.
	#[inline]
	fn effective_revision(&self) -> Option<Revnum> {
		self.revision.or(self.original_revision)
	}
}

/// Summary of a working copy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RevisionStatus {
	/// Lowest revision found. `None` if no node had a revision.
	pub min_rev: Option<Revnum>,
	/// Highest revision found. `None` if no node had a revision.
	pub max_rev: Option<Revnum>,
	/// Working copy is (at least partially) switched.
	pub switched: bool,
	/// Working copy has local text or property modifications.
	pub modified: bool,
	/// Working copy has nodes checked out with depth other than infinity.
	pub sparse_checkout: bool,
}

/// Builder for [`RevisionStatus`], fed one [`NodeInfo`] at a time.
///
/// # Example
///
/// ```
/// use wc_revision_status::{NodeInfo, RevisionStatusBuilder};
///
/// let mut builder = RevisionStatusBuilder::new("wc", Some("trunk"));
/// builder.add(&NodeInfo {
/// 	path: "wc".to_string(),
/// 	revision: Some(10),
/// 	url: Some("https://example.com/repo/trunk".to_string()),
/// 	depth_infinite: true,
/// 	..NodeInfo::default()
/// });
/// let status = builder.finish();
/// assert_eq!(status.min_rev, Some(10));
/// assert!(!status.switched);
/// ```
#[derive(Clone, Debug)]
pub struct RevisionStatusBuilder {
	status: RevisionStatus,
	wc_path: String,
	trail_url: Option<String>,
	wc_url: Option<String>,
}

impl RevisionStatusBuilder {
	/// Create builder for working copy rooted at `wc_path`.
	///
	/// If `trail_url` is given, working copy is reported as switched unless
	/// URL of `wc_path` ends with it.
	pub fn new(wc_path: impl Into<String>, trail_url: Option<&str>) -> Self {
		Self {
			status: RevisionStatus::default(),
			wc_path: wc_path.into(),
			trail_url: trail_url.map(str::to_string),
			wc_url: None,
		}
	}

	pub fn add(&mut self, node: &NodeInfo) {
		let status = &mut self.status;
		status.modified |= node.text_modified | node.props_modified;
		status.switched |= node.switched;
		status.sparse_checkout |= !node.depth_infinite;

		if let Some(revision) = node.effective_revision() {
			status.min_rev = Some(status.min_rev.map_or(revision, |min| min.min(revision)));
			status.max_rev = Some(status.max_rev.map_or(revision, |max| max.max(revision)));
		}

		if self.wc_url.is_none() && node.path == self.wc_path {
			self.wc_url = node.url.clone();
		}

		trace!(path = %node.path, revision = ?node.effective_revision(), "add node");
	}

	pub fn finish(self) -> RevisionStatus {
		let mut status = self.status;

		if !status.switched {
			if let Some(trail_url) = &self.trail_url {
				// Root URL unknown counts as switched
				status.switched = match &self.wc_url {
					Some(wc_url) => !wc_url.ends_with(trail_url.as_str()),
					None => true,
				};
			}
		}

		debug!(
			wc_path = %self.wc_path,
			min_rev = ?status.min_rev,
			max_rev = ?status.max_rev,
			switched = status.switched,
			modified = status.modified,
			sparse_checkout = status.sparse_checkout,
			"revision status"
		);
		status
	}
}

/// Fold `nodes` into a [`RevisionStatus`].
///
/// Stops at the first error from `nodes` and returns it.
pub fn revision_status<I, E>(
	nodes: I,
	wc_path: &str,
	trail_url: Option<&str>,
) -> Result<RevisionStatus, E>
where
	I: IntoIterator<Item = Result<NodeInfo, E>>,
{
	let mut builder = RevisionStatusBuilder::new(wc_path, trail_url);
	for node in nodes {
		builder.add(&node?);
	}
	Ok(builder.finish())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn node(path: &str, revision: Option<Revnum>) -> NodeInfo {
		NodeInfo {
			path: path.to_string(),
			revision,
			url: Some(format!("https://example.com/repo/trunk/{}", path)),
			depth_infinite: true,
			..NodeInfo::default()
		}
	}

	fn fold(nodes: Vec<NodeInfo>, trail_url: Option<&str>) -> RevisionStatus {
		revision_status(nodes.into_iter().map(Ok::<_, ()>), "wc", trail_url).unwrap()
	}

	#[test]
	fn empty() {
		let status = fold(vec![], None);
		assert_eq!(status, RevisionStatus::default());
	}

	#[test]
	fn min_max_with_added_node() {
		let added = NodeInfo {
			original_revision: Some(3),
			..node("wc/added", None)
		};
		let status = fold(vec![node("wc", Some(5)), node("wc/a", Some(7)), added], None);
		assert_eq!(status.min_rev, Some(3));
		assert_eq!(status.max_rev, Some(7));
		assert!(!status.switched);
	}

	#[test]
	fn node_without_any_revision_ignored() {
		let status = fold(vec![node("wc", Some(5)), node("wc/new", None)], None);
		assert_eq!(status.min_rev, Some(5));
		assert_eq!(status.max_rev, Some(5));
	}

	#[test]
	fn flags() {
		let modified = NodeInfo {
			props_modified: true,
			..node("wc/a", Some(2))
		};
		let sparse = NodeInfo {
			depth_infinite: false,
			..node("wc/b", Some(2))
		};
		let status = fold(vec![modified, sparse], None);
		assert!(status.modified);
		assert!(status.sparse_checkout);
		assert!(!status.switched);

		let switched = NodeInfo {
			switched: true,
			..node("wc/c", Some(2))
		};
		assert!(fold(vec![switched], None).switched);
	}

	#[test]
	fn trailing_url() {
		let root = NodeInfo {
			url: Some("https://example.com/repo/trunk".to_string()),
			..node("wc", Some(1))
		};
		assert!(!fold(vec![root.clone()], Some("trunk")).switched);
		assert!(!fold(vec![root.clone()], Some("repo/trunk")).switched);
		assert!(fold(vec![root.clone()], Some("branches/b1")).switched);
		// Trailing URL longer than root URL
		assert!(fold(vec![root], Some("https://example.com/repo/trunk/x")).switched);
	}

	#[test]
	fn trailing_url_with_unknown_root() {
		// Root path never seen
		assert!(fold(vec![node("wc/a", Some(1))], Some("trunk")).switched);

		let root = NodeInfo {
			url: None,
			..node("wc", Some(1))
		};
		assert!(fold(vec![root], Some("trunk")).switched);
	}

	#[test]
	fn scanner_error_propagates() {
		let nodes = vec![Ok(node("wc", Some(1))), Err("scan failed")];
		assert_eq!(revision_status(nodes, "wc", None), Err("scan failed"));
	}
}
