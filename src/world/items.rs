use super::InventorySnapshot;

/// Food items in preference order (best first).
pub const FOOD_ITEMS: &[&str] = &[
    "golden_carrot",
    "cooked_beef",
    "cooked_porkchop",
    "cooked_mutton",
    "cooked_salmon",
    "cooked_chicken",
    "cooked_cod",
    "baked_potato",
    "bread",
    "carrot",
    "apple",
    "melon_slice",
    "sweet_berries",
    "beef",
    "porkchop",
];

/// Weapons in preference order (best first).
pub const WEAPON_ITEMS: &[&str] = &[
    "netherite_sword",
    "diamond_sword",
    "netherite_axe",
    "diamond_axe",
    "iron_sword",
    "iron_axe",
    "stone_sword",
    "stone_axe",
    "golden_sword",
    "wooden_sword",
    "wooden_axe",
];

pub const HOSTILE_MOBS: &[&str] = &[
    "zombie",
    "zombie_villager",
    "husk",
    "drowned",
    "skeleton",
    "stray",
    "creeper",
    "spider",
    "cave_spider",
    "witch",
    "slime",
    "phantom",
    "pillager",
    "vindicator",
    "blaze",
    "wither_skeleton",
    "enderman",
    "silverfish",
];

pub fn is_food(item: &str) -> bool {
    FOOD_ITEMS.contains(&item)
}

pub fn is_weapon(item: &str) -> bool {
    WEAPON_ITEMS.contains(&item)
}

pub fn is_hostile(name: &str) -> bool {
    HOSTILE_MOBS.contains(&name)
}

pub fn best_food(inventory: &InventorySnapshot) -> Option<&'static str> {
    best_of(FOOD_ITEMS, inventory)
}

pub fn best_weapon(inventory: &InventorySnapshot) -> Option<&'static str> {
    best_of(WEAPON_ITEMS, inventory)
}

fn best_of(ranked: &[&'static str], inventory: &InventorySnapshot) -> Option<&'static str> {
    ranked
        .iter()
        .copied()
        .find(|item| inventory.get(*item).copied().unwrap_or(0) > 0)
}
