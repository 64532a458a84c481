use crate::types::{DropdownOption, GroupedOption};
use std::collections::HashSet;

/// Label of the sentinel entry that lets an option be moved back to the top level.
pub const NO_CATEGORY_LABEL: &str = "(keine)";

fn normalized_category(option: &DropdownOption) -> Option<&str> {
    option.category.as_deref().filter(|c| !c.is_empty())
}

/// Groups a flat option list: each top-level option is followed by its children.
///
/// Children whose category does not name a top-level option are orphaned and
/// flattened to top-level entries where they appeared.
pub fn group_options(options: &[DropdownOption]) -> Vec<GroupedOption> {
    let top_values: HashSet<&str> = options
        .iter()
        .filter(|o| o.is_top_level())
        .map(|o| o.value.as_str())
        .collect();

    let is_parent = |o: &DropdownOption| match normalized_category(o) {
        None => true,
        Some(category) => !top_values.contains(category),
    };

    let mut grouped = Vec::with_capacity(options.len());
    for parent in options.iter().filter(|o| is_parent(o)) {
        grouped.push(GroupedOption {
            value: Some(parent.value.clone()),
            label: parent.label.clone(),
            category: None,
            category_label: None,
            is_sub_option: false,
        });

        // orphans are never referenced as a category themselves
        if !top_values.contains(parent.value.as_str()) {
            continue;
        }

        for child in options
            .iter()
            .filter(|o| normalized_category(o) == Some(parent.value.as_str()))
        {
            grouped.push(GroupedOption {
                value: Some(child.value.clone()),
                label: child.label.clone(),
                category: Some(parent.value.clone()),
                category_label: Some(parent.label.clone()),
                is_sub_option: true,
            });
        }
    }
    grouped
}

/// Sentinel entry whose value is `None`.
pub fn no_category_option() -> GroupedOption {
    GroupedOption {
        value: None,
        label: NO_CATEGORY_LABEL.to_string(),
        category: None,
        category_label: None,
        is_sub_option: false,
    }
}

/// Parents only, prefixed with the "(keine)" sentinel, for category assignment dropdowns.
pub fn top_options(grouped: &[GroupedOption]) -> Vec<GroupedOption> {
    std::iter::once(no_category_option())
        .chain(grouped.iter().filter(|o| !o.is_sub_option).cloned())
        .collect()
}

/// Child options referenced by `values`, in option order.
pub fn sub_options<'a>(options: &'a [DropdownOption], values: &[String]) -> Vec<&'a DropdownOption> {
    options
        .iter()
        .filter(|o| !o.is_top_level() && values.contains(&o.value))
        .collect()
}
