// Test structural mutation of the element tree: index coherence, slot arity,
// cloning and cursor safety across removals

use mathdoc_core::{
    CursorStateCollection, CursorStateEntry, ElementId, ElementKind, ElementTree, RegionSpan,
};

fn literal(tree: &mut ElementTree, digits: &str) -> ElementId {
    let id = tree.create(ElementKind::IntegerLiteral);
    tree.set_text(id, 0, digits, None).expect("literal has one region");
    id
}

/// Every child's parent points back at the container that holds it
fn assert_index_coherent(tree: &ElementTree, root: ElementId) {
    for element in tree.descendants(root) {
        if let Some(parent) = tree.parent(element) {
            let index = tree
                .index_of_child(parent, element)
                .expect("child must be found in its parent");
            assert_eq!(tree.child(parent, index), Some(element));
        }
        for (index, child) in tree.children(element).into_iter().enumerate() {
            if let Some(child) = child {
                assert_eq!(tree.parent(child), Some(element), "child {} of {:?}", index, element);
            }
        }
    }
}

/// Build `frame[ 1 + (2 * 3), matrix[[4], [5, 6]] ]`
fn sample_document(tree: &mut ElementTree) -> ElementId {
    let frame = tree.create(ElementKind::Frame);

    let add = tree.create(ElementKind::Addition);
    let multiply = tree.create(ElementKind::Multiplication);
    let one = literal(tree, "1");
    let two = literal(tree, "2");
    let three = literal(tree, "3");
    tree.set_child(multiply, 0, Some(two), None).unwrap();
    tree.set_child(multiply, 1, Some(three), None).unwrap();
    tree.set_child(add, 0, Some(one), None).unwrap();
    tree.set_child(add, 1, Some(multiply), None).unwrap();
    tree.append(frame, add, None).unwrap();

    let matrix = tree.create(ElementKind::Matrix);
    tree.insert_group(matrix, 0).unwrap();
    tree.insert_group(matrix, 1).unwrap();
    for (group, digits) in [(0, "4"), (1, "5"), (1, "6")] {
        let entry = literal(tree, digits);
        let offset = tree.group_child_count(matrix, group).unwrap();
        tree.insert_into_group(matrix, group, offset, entry, None).unwrap();
    }
    tree.append(frame, matrix, None).unwrap();
    frame
}

#[test]
fn test_index_coherence_through_edits() {
    let mut tree = ElementTree::new();
    let frame = sample_document(&mut tree);
    assert_index_coherent(&tree, frame);

    // Move the multiplication out of the addition and into the frame
    let add = tree.child(frame, 0).unwrap();
    let multiply = tree.child(add, 1).unwrap();
    tree.insert_before(frame, 0, multiply, None).unwrap();
    assert_eq!(tree.child(add, 1), None);
    assert_eq!(tree.index_of_child(frame, multiply), Some(0));
    assert_index_coherent(&tree, frame);

    // Remove the middle matrix entry
    let matrix = tree.child(frame, 2).unwrap();
    tree.remove_child(matrix, 1, None).unwrap();
    assert_eq!(tree.group_child_count(matrix, 1), Some(1));
    assert_index_coherent(&tree, frame);
}

#[test]
fn test_fixed_removal_preserves_arity() {
    let mut tree = ElementTree::new();
    let add = tree.create(ElementKind::Addition);
    let one = literal(&mut tree, "1");
    let two = literal(&mut tree, "2");
    tree.set_child(add, 0, Some(one), None).unwrap();
    tree.set_child(add, 1, Some(two), None).unwrap();

    tree.remove_child(add, 0, None).unwrap();
    assert_eq!(tree.number_children(add), 2);
    assert_eq!(tree.child(add, 0), None);
    assert!(!tree.contains(one));

    // Removing an already-empty slot is harmless
    tree.remove_child(add, 0, None).unwrap();
    assert_eq!(tree.number_children(add), 2);
}

#[test]
fn test_positional_removal_shrinks() {
    let mut tree = ElementTree::new();
    let frame = tree.create(ElementKind::Frame);
    let one = literal(&mut tree, "1");
    let two = literal(&mut tree, "2");
    tree.append(frame, one, None).unwrap();
    tree.append(frame, two, None).unwrap();

    tree.remove_child_element(frame, one, None).unwrap();
    assert_eq!(tree.number_children(frame), 1);
    assert_eq!(tree.child(frame, 0), Some(two));
    assert!(tree.remove_child_element(frame, one, None).is_err());
    assert!(tree.remove_child(frame, 5, None).is_err());
}

#[test]
fn test_take_child_keeps_subtree_alive() {
    let mut tree = ElementTree::new();
    let frame = sample_document(&mut tree);
    let add = tree.child(frame, 0).unwrap();

    let taken = tree.take_child(frame, 0, None).unwrap();
    assert_eq!(taken, Some(add));
    assert_eq!(tree.parent(add), None);
    assert_eq!(tree.descendants(add).len(), 5);
}

#[test]
fn test_clone_round_trip() {
    let mut tree = ElementTree::new();
    let frame = sample_document(&mut tree);
    let copy = tree.clone_element(frame, None).expect("clone should succeed");

    let originals = tree.descendants(frame);
    let copies = tree.descendants(copy);
    assert_eq!(originals.len(), copies.len());
    for (original, copied) in originals.iter().zip(&copies) {
        assert_ne!(original, copied);
        assert_eq!(tree.kind(*original), tree.kind(*copied));
        assert_ne!(
            tree.get(*original).unwrap().handle(),
            tree.get(*copied).unwrap().handle()
        );
        for region in 0..tree.number_regions(*original) {
            assert_eq!(tree.text(*original, region), tree.text(*copied, region));
        }
    }
    let matrix = tree.child(copy, 1).unwrap();
    assert_eq!(tree.number_groups(matrix), 2);
    assert_index_coherent(&tree, copy);
}

#[test]
fn test_partial_clone_clips_regions() {
    let mut tree = ElementTree::new();
    let variable = tree.create(ElementKind::Variable);
    tree.set_text(variable, 0, "alpha", None).unwrap();
    tree.set_text(variable, 1, "max", None).unwrap();

    let span = RegionSpan::between(0, 2, 0, 4);
    let copy = tree.clone_element(variable, Some(&span)).unwrap();
    assert_eq!(tree.text(copy, 0), Some("ph"));
    assert_eq!(tree.text(copy, 1), Some(""));

    let copy = tree.clone_element(variable, Some(&RegionSpan::to_end(0, 3))).unwrap();
    assert_eq!(tree.text(copy, 0), Some("ha"));
    assert_eq!(tree.text(copy, 1), Some("max"));
}

#[test]
fn test_no_dangling_cursors_after_removal() {
    let mut tree = ElementTree::new();
    let frame = sample_document(&mut tree);
    let add = tree.child(frame, 0).unwrap();
    let matrix = tree.child(frame, 1).unwrap();
    let multiply = tree.child(add, 1).unwrap();
    let three = tree.child(multiply, 1).unwrap();

    // One entry deep inside the addition, one on the matrix
    let mut cursors = CursorStateCollection::new();
    let deep = cursors.push_entry(CursorStateEntry::at_text(three, 0, 1));
    let element = cursors.push_entry(CursorStateEntry::on_element(multiply));
    let survivor = cursors.push_entry(CursorStateEntry::on_element(matrix));

    tree.remove_child(frame, 0, Some(&mut cursors)).unwrap();

    for entry in cursors.entries() {
        if let Some(anchor) = entry.anchor_element() {
            assert!(tree.contains(anchor), "entry {:?} points at a destroyed element", entry);
        }
    }
    // The nearest surviving sibling is the matrix; its last position is the end of "6"
    let six = tree.child(matrix, 2).unwrap();
    assert_eq!(cursors.entry(deep), Some(&CursorStateEntry::at_text(six, 0, 1)));
    assert_eq!(cursors.entry(element), cursors.entry(deep));
    assert_eq!(cursors.entry(survivor), Some(&CursorStateEntry::on_element(matrix)));

    // Emptying the frame leaves a slot placeholder
    tree.remove_child(frame, 0, Some(&mut cursors)).unwrap();
    assert_eq!(cursors.entry(deep), Some(&CursorStateEntry::at_slot(frame, 0)));

    // Destroying the root invalidates everything inside it
    tree.destroy(frame, Some(&mut cursors)).unwrap();
    assert!(cursors.entries().iter().all(|entry| !entry.is_valid()));
    assert!(tree.is_empty());
}

#[test]
fn test_fixed_slot_removal_leaves_slot_placeholder() {
    let mut tree = ElementTree::new();
    let divide = tree.create(ElementKind::Division);
    let one = literal(&mut tree, "1");
    tree.set_child(divide, 1, Some(one), None).unwrap();

    let mut cursors = CursorStateCollection::new();
    let entry = cursors.push_entry(CursorStateEntry::at_text(one, 0, 0));
    tree.set_child(divide, 1, None, Some(&mut cursors)).unwrap();

    assert_eq!(cursors.entry(entry), Some(&CursorStateEntry::at_slot(divide, 1)));

    // Filling the slot moves the placeholder into the new child
    let two = literal(&mut tree, "2");
    tree.set_child(divide, 1, Some(two), Some(&mut cursors)).unwrap();
    assert_eq!(cursors.entry(entry), Some(&CursorStateEntry::at_text(two, 0, 0)));
}
