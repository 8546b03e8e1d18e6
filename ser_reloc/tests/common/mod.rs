#![allow(dead_code)]

use std::{
	ffi::{CStr, CString},
	os::raw::c_char,
	ptr::{self, NonNull},
};

use rand::Rng;
use rand_pcg::Lcg64Xsh32;
use ser_reloc::{peek, Resolve, Serialize};

/// Tree node, linked to its first child and next sibling.
///
/// All fields are pointer-sized, so there is no padding.
#[derive(Serialize, Resolve)]
#[repr(C)]
pub struct TreeNode {
	pub id: u64,
	#[ser(string)]
	pub name: *const c_char,
	#[ser(push)]
	pub first_child: *const TreeNode,
	#[ser(push)]
	pub next_sibling: *const TreeNode,
	#[ser(push)]
	pub payload: Option<NonNull<Payload>>,
	/// Transient, never serialized.
	#[ser(null)]
	pub cache: *mut u8,
}

#[derive(Serialize, Resolve)]
#[repr(C)]
pub struct Payload {
	pub values: [u32; 4],
	#[ser(string)]
	pub label: *const c_char,
}

/// Owned description of a tree, used to generate a [`TreeNode`] graph and to
/// check the result of deserializing it.
#[derive(Clone, Debug, PartialEq)]
pub struct Expected {
	pub id: u64,
	pub name: Option<String>,
	pub children: Vec<Expected>,
	pub payload: Option<ExpectedPayload>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpectedPayload {
	pub values: [u32; 4],
	pub label: String,
}

impl Expected {
	/// Generate random tree, deterministic for a given `seed`.
	pub fn generate(seed: u64, max_depth: usize) -> Self {
		let mut rng = Lcg64Xsh32::new(0xcafef00dd15ea5e5, seed);
		let mut next_id = 0;
		Self::generate_node(&mut rng, &mut next_id, max_depth)
	}

	fn generate_node<R: Rng>(rng: &mut R, next_id: &mut u64, depth: usize) -> Self {
		const NAMES: [&str; 6] = ["root", "src", "lib", "tests", "", "a much longer name"];

		let id = *next_id;
		*next_id += 1;

		let name = if rng.gen_bool(0.9) {
			Some(format!("{}-{}", NAMES[rng.gen_range(0..NAMES.len())], id))
		} else {
			None
		};
		let payload = if rng.gen_bool(0.5) {
			Some(ExpectedPayload {
				values: rng.gen(),
				label: "x".repeat(rng.gen_range(0..20)),
			})
		} else {
			None
		};
		let num_children = if depth == 0 { 0 } else { rng.gen_range(0..4) };
		let children = (0..num_children)
			.map(|_| Self::generate_node(rng, next_id, depth - 1))
			.collect();

		Self {
			id,
			name,
			children,
			payload,
		}
	}

	pub fn count(&self) -> usize {
		1 + self.children.iter().map(Expected::count).sum::<usize>()
	}
}

/// Owner of a graph of [`TreeNode`]s and the strings they point to.
pub struct Tree {
	root: *const TreeNode,
	nodes: Vec<Box<TreeNode>>,
	payloads: Vec<Box<Payload>>,
	strings: Vec<CString>,
}

impl Tree {
	pub fn build(expected: &Expected) -> Self {
		let mut tree = Self {
			root: ptr::null(),
			nodes: vec![],
			payloads: vec![],
			strings: vec![],
		};
		tree.root = tree.build_node(expected, ptr::null());
		tree
	}

	pub fn root(&self) -> &TreeNode {
		unsafe { &*self.root }
	}

	fn build_node(&mut self, expected: &Expected, next_sibling: *const TreeNode) -> *const TreeNode {
		let mut first_child = ptr::null();
		for child in expected.children.iter().rev() {
			first_child = self.build_node(child, first_child);
		}

		let payload = expected.payload.as_ref().map(|payload| {
			let label = self.add_string(&payload.label);
			let mut payload = Box::new(Payload {
				values: payload.values,
				label,
			});
			let ptr = NonNull::from(&mut *payload);
			self.payloads.push(payload);
			ptr
		});

		let name = match &expected.name {
			Some(name) => self.add_string(name),
			None => ptr::null(),
		};

		let node = Box::new(TreeNode {
			id: expected.id,
			name,
			first_child,
			next_sibling,
			payload,
			cache: NonNull::dangling().as_ptr(),
		});
		let ptr: *const TreeNode = &*node;
		self.nodes.push(node);
		ptr
	}

	fn add_string(&mut self, s: &str) -> *const c_char {
		let s = CString::new(s).unwrap();
		let ptr = s.as_ptr();
		self.strings.push(s);
		ptr
	}
}

unsafe fn read_str(ptr: *const c_char) -> Option<String> {
	if ptr.is_null() {
		None
	} else {
		Some(CStr::from_ptr(ptr).to_str().unwrap().to_string())
	}
}

/// Check deserialized tree, with pointers resolved in place, matches
/// `expected`.
pub unsafe fn check_resolved(node: &TreeNode, expected: &Expected) {
	assert_eq!(node.id, expected.id);
	assert_eq!(read_str(node.name), expected.name);
	assert!(node.cache.is_null());

	match (node.payload, &expected.payload) {
		(Some(payload), Some(expected_payload)) => {
			let payload = payload.as_ref();
			assert_eq!(payload.values, expected_payload.values);
			assert_eq!(read_str(payload.label).as_ref(), Some(&expected_payload.label));
		}
		(None, None) => {}
		(payload, expected_payload) => panic!(
			"payload mismatch on node {}: {:?} vs {:?}",
			expected.id, payload, expected_payload
		),
	}

	let mut child = node.first_child;
	for expected_child in &expected.children {
		assert!(!child.is_null());
		check_resolved(&*child, expected_child);
		child = (*child).next_sibling;
	}
	assert!(child.is_null());
}

/// Check tree in a serialized buffer matches `expected`, following offsets
/// with [`peek`], without modifying the buffer.
pub unsafe fn check_peeked(node: *const TreeNode, expected: &Expected) {
	assert_eq!((*node).id, expected.id);
	assert_eq!(read_str(peek(node, ptr::addr_of!((*node).name))), expected.name);
	assert!(peek(node, ptr::addr_of!((*node).cache)).is_null());

	let payload = peek(node, ptr::addr_of!((*node).payload));
	match (payload, &expected.payload) {
		(Some(payload), Some(expected_payload)) => {
			let payload = payload.as_ptr();
			assert_eq!((*payload).values, expected_payload.values);
			let label = peek(payload, ptr::addr_of!((*payload).label));
			assert_eq!(read_str(label).as_ref(), Some(&expected_payload.label));
		}
		(None, None) => {}
		(payload, expected_payload) => panic!(
			"payload mismatch on node {}: {:?} vs {:?}",
			expected.id, payload, expected_payload
		),
	}

	let mut child = peek(node, ptr::addr_of!((*node).first_child));
	for expected_child in &expected.children {
		assert!(!child.is_null());
		check_peeked(child, expected_child);
		child = peek(child, ptr::addr_of!((*child).next_sibling));
	}
	assert!(child.is_null());
}

/// Seeds used by tests over random trees.
pub const SEEDS: [u64; 4] = [0, 1, 2, 1234];
