use decor_core::{
    AssistantTask, ContextAssembler, PricingCatalog, ProjectEstimate, Region, RetrievedPassage,
    CONTEXT_END, CONTEXT_START, FALLBACK_PERSONA, NO_CONTEXT_FALLBACK,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn passage_strategy() -> impl Strategy<Value = RetrievedPassage> {
    (
        "[A-Za-z][A-Za-z ]{0,40}",
        prop::option::of(0u64..10_000_000),
        0.0f64..2.0,
    )
        .prop_map(|(content, price, distance)| {
            let mut metadata = Map::new();
            if let Some(price) = price {
                metadata.insert("price_dalam_kota".to_string(), Value::from(price));
            }
            RetrievedPassage::new(content, metadata, distance)
        })
}

proptest! {
    #[test]
    fn assembly_is_pure_and_ordered(passages in prop::collection::vec(passage_strategy(), 0..6)) {
        let assembler = ContextAssembler::default();
        let first = assembler.assemble(&passages, FALLBACK_PERSONA);
        let second = assembler.assemble(&passages, FALLBACK_PERSONA);
        prop_assert_eq!(&first, &second);

        let text = first.as_str();
        prop_assert!(text.starts_with(FALLBACK_PERSONA));
        prop_assert_eq!(first.has_retrieved_passages(), !passages.is_empty());
        prop_assert_eq!(text.contains(NO_CONTEXT_FALLBACK), passages.is_empty());

        let mut cursor = 0;
        for passage in &passages {
            let found = text[cursor..].find(passage.content.trim());
            prop_assert!(found.is_some());
            cursor += found.unwrap_or_default();
        }
    }
}

#[test]
fn structured_task_prompt_and_context_fit_together() {
    let catalog = PricingCatalog::builtin();
    let task = AssistantTask::Proposal(ProjectEstimate {
        client_name: "Pak Budi".to_string(),
        region: Region::Dalam,
        kitchen_length_m: 4.0,
        wallpanel_type: "Minimalis".to_string(),
        wallpanel_area_m2: 12.0,
    });
    task.validate().unwrap();
    let prompt = task.user_message(&catalog).unwrap();
    assert!(prompt.contains("Pak Budi"));

    let metadata = match json!({"price_dalam_kota": 3500000, "price_luar_kota": 3700000}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let passages = vec![RetrievedPassage::new(
        "Kitchen Set Aluminium",
        metadata,
        0.12,
    )];
    let context = ContextAssembler::default()
        .with_reference_data(catalog.to_json().unwrap())
        .assemble(&passages, "PERAN: Sales");
    let text = context.as_str();
    let start = text.find(CONTEXT_START).unwrap();
    let end = text.find(CONTEXT_END).unwrap();
    assert!(start < end);
    assert!(text[start..end].contains("Rp 3.500.000"));
    assert!(text[end..].contains("DATA HARGA: "));
    assert!(text[end..].contains("Garansi 12 Bulan"));
}
