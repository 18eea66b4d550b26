//! `KEY=VALUE` attribute lists as found after the colon of a directive.

/// Borrowed view over one attribute list.
///
/// Values keep their original text minus surrounding quotes; commas inside
/// quotes do not split. Items without `=` are skipped.
#[derive(Debug, Clone, Default)]
pub struct AttributeList<'a> {
    items: Vec<(&'a str, &'a str)>,
}

impl<'a> AttributeList<'a> {
    pub fn parse(list: &'a str) -> Self {
        let mut items = Vec::new();
        let mut in_quotes = false;
        let mut item_start = 0;

        for (idx, ch) in list.char_indices() {
            match ch {
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    push_item(&mut items, &list[item_start..idx]);
                    item_start = idx + 1;
                }
                _ => {}
            }
        }
        push_item(&mut items, &list[item_start..]);

        Self { items }
    }

    /// Value of the first attribute named exactly `key`
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.items
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| *value)
    }

    /// Like [`get`](Self::get) but missing attributes read as empty text
    pub fn text(&self, key: &str) -> &'a str {
        self.get(key).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn push_item<'a>(items: &mut Vec<(&'a str, &'a str)>, item: &'a str) {
    let Some((name, value)) = item.split_once('=') else {
        return;
    };
    let name = name.trim();
    if name.is_empty() {
        return;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .map(|v| v.strip_suffix('"').unwrap_or(v))
        .unwrap_or(value);
    items.push((name, value));
}
