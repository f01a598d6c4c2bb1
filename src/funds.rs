use serde::{Deserialize, Serialize};

/// Closed set of fund designations a donor can give towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundType {
    General,
    Zakat,
    Sadaqah,
    BuildingFund,
    RamadanCampaign,
    Education,
    Emergency,
}

impl FundType {
    pub const ALL: [FundType; 7] = [
        FundType::General,
        FundType::Zakat,
        FundType::Sadaqah,
        FundType::BuildingFund,
        FundType::RamadanCampaign,
        FundType::Education,
        FundType::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FundType::General => "general",
            FundType::Zakat => "zakat",
            FundType::Sadaqah => "sadaqah",
            FundType::BuildingFund => "building_fund",
            FundType::RamadanCampaign => "ramadan_campaign",
            FundType::Education => "education",
            FundType::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<FundType> {
        match s {
            "general" => Some(FundType::General),
            "zakat" => Some(FundType::Zakat),
            "sadaqah" => Some(FundType::Sadaqah),
            "building_fund" => Some(FundType::BuildingFund),
            "ramadan_campaign" => Some(FundType::RamadanCampaign),
            "education" => Some(FundType::Education),
            "emergency" => Some(FundType::Emergency),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FundType::General => "General Fund",
            FundType::Zakat => "Zakat",
            FundType::Sadaqah => "Sadaqah",
            FundType::BuildingFund => "Building Fund",
            FundType::RamadanCampaign => "Ramadan Campaign",
            FundType::Education => "Education",
            FundType::Emergency => "Emergency Relief",
        }
    }

    pub fn arabic_label(&self) -> &'static str {
        match self {
            FundType::General => "صندوق عام",
            FundType::Zakat => "الزكاة",
            FundType::Sadaqah => "صدقة",
            FundType::BuildingFund => "صندوق البناء",
            FundType::RamadanCampaign => "حملة رمضان",
            FundType::Education => "التعليم",
            FundType::Emergency => "إغاثة طارئة",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FundType::General => "Support the day-to-day operations of the mosque",
            FundType::Zakat => "Obligatory charity for eligible recipients",
            FundType::Sadaqah => "Voluntary charity for any good cause",
            FundType::BuildingFund => "Contribute to mosque maintenance and expansion",
            FundType::RamadanCampaign => "Special Ramadan programmes and iftar",
            FundType::Education => "Support Islamic education and classes",
            FundType::Emergency => "Help those in urgent need",
        }
    }
}

impl std::fmt::Display for FundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
pub struct FundInfo {
    pub fund_type: FundType,
    pub label: &'static str,
    pub arabic: &'static str,
    pub description: &'static str,
}

/// Catalog entries consumed by the donation UI's fund picker.
pub fn catalog() -> Vec<FundInfo> {
    FundType::ALL
        .iter()
        .map(|f| FundInfo {
            fund_type: *f,
            label: f.label(),
            arabic: f.arabic_label(),
            description: f.description(),
        })
        .collect()
}
