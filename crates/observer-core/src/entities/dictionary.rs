//! Alias dictionary for countries, regions, and blocs.
//!
//! Many surface forms map to one normalized id ("us", "america",
//! "washington" -> `united_states`). Matching is case-insensitive and
//! requires non-alphanumeric boundaries on both sides so "america" never
//! fires inside "panamerican".

use once_cell::sync::Lazy;

use crate::models::EntityType;

/// One dictionary row: alias -> (normalized id, display name, type, salience).
pub struct GeoAlias {
    pub alias: &'static str,
    pub normalized: &'static str,
    pub display: &'static str,
    pub entity_type: EntityType,
    pub salience: f64,
}

const fn country(alias: &'static str, normalized: &'static str, display: &'static str) -> GeoAlias {
    GeoAlias {
        alias,
        normalized,
        display,
        entity_type: EntityType::Country,
        salience: 0.7,
    }
}

/// Capital-city and adjective aliases are weaker evidence than the name
/// itself.
const fn country_weak(
    alias: &'static str,
    normalized: &'static str,
    display: &'static str,
) -> GeoAlias {
    GeoAlias {
        alias,
        normalized,
        display,
        entity_type: EntityType::Country,
        salience: 0.6,
    }
}

const fn region(alias: &'static str, normalized: &'static str, display: &'static str) -> GeoAlias {
    GeoAlias {
        alias,
        normalized,
        display,
        entity_type: EntityType::Region,
        salience: 0.6,
    }
}

const fn bloc(alias: &'static str, normalized: &'static str, display: &'static str) -> GeoAlias {
    GeoAlias {
        alias,
        normalized,
        display,
        entity_type: EntityType::Bloc,
        salience: 0.65,
    }
}

pub static GEO_ALIASES: Lazy<Vec<GeoAlias>> = Lazy::new(|| {
    vec![
        country("united states", "united_states", "United States"),
        country("us", "united_states", "United States"),
        country("usa", "united_states", "United States"),
        country("u.s.", "united_states", "United States"),
        country_weak("america", "united_states", "United States"),
        country_weak("american", "united_states", "United States"),
        country_weak("washington", "united_states", "United States"),
        country("china", "china", "China"),
        country_weak("chinese", "china", "China"),
        country_weak("beijing", "china", "China"),
        country("russia", "russia", "Russia"),
        country_weak("russian", "russia", "Russia"),
        country_weak("moscow", "russia", "Russia"),
        country("united kingdom", "united_kingdom", "United Kingdom"),
        country("uk", "united_kingdom", "United Kingdom"),
        country("britain", "united_kingdom", "United Kingdom"),
        country_weak("british", "united_kingdom", "United Kingdom"),
        country_weak("london", "united_kingdom", "United Kingdom"),
        country("germany", "germany", "Germany"),
        country_weak("german", "germany", "Germany"),
        country_weak("berlin", "germany", "Germany"),
        country("france", "france", "France"),
        country_weak("french", "france", "France"),
        country_weak("paris", "france", "France"),
        country("japan", "japan", "Japan"),
        country_weak("japanese", "japan", "Japan"),
        country_weak("tokyo", "japan", "Japan"),
        country("india", "india", "India"),
        country_weak("indian", "india", "India"),
        country_weak("new delhi", "india", "India"),
        country("israel", "israel", "Israel"),
        country_weak("israeli", "israel", "Israel"),
        country("iran", "iran", "Iran"),
        country_weak("iranian", "iran", "Iran"),
        country_weak("tehran", "iran", "Iran"),
        country("ukraine", "ukraine", "Ukraine"),
        country_weak("ukrainian", "ukraine", "Ukraine"),
        country_weak("kyiv", "ukraine", "Ukraine"),
        country("taiwan", "taiwan", "Taiwan"),
        country_weak("taipei", "taiwan", "Taiwan"),
        country("north korea", "north_korea", "North Korea"),
        country_weak("pyongyang", "north_korea", "North Korea"),
        country("south korea", "south_korea", "South Korea"),
        country_weak("seoul", "south_korea", "South Korea"),
        country("saudi arabia", "saudi_arabia", "Saudi Arabia"),
        country_weak("riyadh", "saudi_arabia", "Saudi Arabia"),
        country("brazil", "brazil", "Brazil"),
        country_weak("brasilia", "brazil", "Brazil"),
        country("canada", "canada", "Canada"),
        country_weak("ottawa", "canada", "Canada"),
        country("mexico", "mexico", "Mexico"),
        country("australia", "australia", "Australia"),
        country_weak("canberra", "australia", "Australia"),
        country("turkey", "turkey", "Turkey"),
        country_weak("ankara", "turkey", "Turkey"),
        country("egypt", "egypt", "Egypt"),
        country_weak("cairo", "egypt", "Egypt"),
        country("nigeria", "nigeria", "Nigeria"),
        country("south africa", "south_africa", "South Africa"),
        country("argentina", "argentina", "Argentina"),
        country("italy", "italy", "Italy"),
        country_weak("rome", "italy", "Italy"),
        country("spain", "spain", "Spain"),
        country_weak("madrid", "spain", "Spain"),
        country("poland", "poland", "Poland"),
        country_weak("warsaw", "poland", "Poland"),
        country("netherlands", "netherlands", "Netherlands"),
        country("switzerland", "switzerland", "Switzerland"),
        country("sweden", "sweden", "Sweden"),
        country("norway", "norway", "Norway"),
        country("greece", "greece", "Greece"),
        country("pakistan", "pakistan", "Pakistan"),
        country("indonesia", "indonesia", "Indonesia"),
        country("vietnam", "vietnam", "Vietnam"),
        country("philippines", "philippines", "Philippines"),
        country("venezuela", "venezuela", "Venezuela"),
        country("cuba", "cuba", "Cuba"),
        country("syria", "syria", "Syria"),
        country("iraq", "iraq", "Iraq"),
        country("afghanistan", "afghanistan", "Afghanistan"),
        country("yemen", "yemen", "Yemen"),
        country("lebanon", "lebanon", "Lebanon"),
        country("jordan", "jordan", "Jordan"),
        country("qatar", "qatar", "Qatar"),
        country("kuwait", "kuwait", "Kuwait"),
        country("ethiopia", "ethiopia", "Ethiopia"),
        country("kenya", "kenya", "Kenya"),
        country("sudan", "sudan", "Sudan"),
        country("libya", "libya", "Libya"),
        country("morocco", "morocco", "Morocco"),
        country("algeria", "algeria", "Algeria"),
        country("colombia", "colombia", "Colombia"),
        country("chile", "chile", "Chile"),
        country("peru", "peru", "Peru"),
        country("thailand", "thailand", "Thailand"),
        country("malaysia", "malaysia", "Malaysia"),
        country("singapore", "singapore", "Singapore"),
        country("new zealand", "new_zealand", "New Zealand"),
        country("ireland", "ireland", "Ireland"),
        country("portugal", "portugal", "Portugal"),
        country("austria", "austria", "Austria"),
        country("belgium", "belgium", "Belgium"),
        country("denmark", "denmark", "Denmark"),
        country("finland", "finland", "Finland"),
        country("hungary", "hungary", "Hungary"),
        country("romania", "romania", "Romania"),
        country("czech republic", "czechia", "Czechia"),
        country("czechia", "czechia", "Czechia"),
        region("middle east", "middle_east", "Middle East"),
        region("europe", "europe", "Europe"),
        region("european", "europe", "Europe"),
        region("asia", "asia", "Asia"),
        region("africa", "africa", "Africa"),
        region("latin america", "latin_america", "Latin America"),
        region("eastern europe", "eastern_europe", "Eastern Europe"),
        region("southeast asia", "southeast_asia", "Southeast Asia"),
        region("balkans", "balkans", "Balkans"),
        region("gulf", "gulf", "Gulf"),
        region("arctic", "arctic", "Arctic"),
        bloc("european union", "european_union", "European Union"),
        bloc("eu", "european_union", "European Union"),
        bloc("nato", "nato", "NATO"),
        bloc("united nations", "united_nations", "United Nations"),
        bloc("un", "united_nations", "United Nations"),
        bloc("opec", "opec", "OPEC"),
        bloc("brics", "brics", "BRICS"),
        bloc("asean", "asean", "ASEAN"),
        bloc("g7", "g7", "G7"),
        bloc("g20", "g20", "G20"),
        bloc("imf", "imf", "IMF"),
        bloc("world bank", "world_bank", "World Bank"),
        bloc("federal reserve", "federal_reserve", "Federal Reserve"),
        bloc("fed", "federal_reserve", "Federal Reserve"),
        bloc("ecb", "ecb", "ECB"),
        bloc("who", "who", "WHO"),
    ]
});
