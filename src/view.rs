//! The denormalized reporting view over the star schema.

use duckdb::Connection;
use log::info;

use crate::load::{quote_identifier, LoadError};

/// A table referenced under an alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }
}

/// A dimension left-joined to the fact table on `fact.fact_key = dimension.dim_key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimensionJoin {
    pub dimension: TableRef,
    pub fact_key: String,
    pub dim_key: String,
}

impl DimensionJoin {
    pub fn new(
        table: impl Into<String>,
        alias: impl Into<String>,
        fact_key: impl Into<String>,
        dim_key: impl Into<String>,
    ) -> Self {
        Self {
            dimension: TableRef::new(table, alias),
            fact_key: fact_key.into(),
            dim_key: dim_key.into(),
        }
    }
}

/// One selected column: `source_alias.column AS alias`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewColumn {
    pub source_alias: String,
    pub column: String,
    pub alias: String,
}

impl ViewColumn {
    pub fn new(
        source_alias: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            source_alias: source_alias.into(),
            column: column.into(),
            alias: alias.into(),
        }
    }
}

/// Layout of the reporting view: the fact table, its dimensions and the selected columns.
///
/// The default describes the `dwpikp` schema and produces the `fact_with_dim` view the KPI
/// queries read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StarSchema {
    pub view_name: String,
    pub fact: TableRef,
    pub dimensions: Vec<DimensionJoin>,
    pub columns: Vec<ViewColumn>,
}

impl Default for StarSchema {
    fn default() -> Self {
        let columns = [
            ("f", "id", "fact_id"),
            ("f", "tk_id_kupec", "kupec_id"),
            ("c", "PolniDatum", "datum"),
            ("c", "DanVTednu", "dan_v_tednu"),
            ("c", "Teden", "teden"),
            ("c", "Mesec", "mesec"),
            ("c", "Leto", "leto"),
            ("l", "Drzava", "drzava"),
            ("l", "Mesto", "mesto"),
            ("k", "novAliVracajoc", "kupec_status"),
            ("k", "steviloTransakcij", "steviloTransakcijKupec"),
            ("i", "Koda", "izdelek_koda"),
            ("i", "NazivIzdelka", "izdelek_naziv"),
            ("i", "Kategorija", "kategorija"),
            ("i", "Cena", "cena_izdelek"),
            ("p", "popustUporabljen", "popust_uporabljen"),
            ("s", "izobrazbenaRaven", "izobrazba"),
            ("s", "zaposlitveniStatus", "zaposlitveni_status"),
            ("d", "spol", "spol"),
            ("d", "starostnaSkupina", "starostna_skupina"),
            ("f", "kolicinaIzdelkov", "kolicina_izdelkov"),
            ("f", "skupniPrihodek", "skupni_prihodek"),
            ("f", "povprecnoPorabljenoNaTransakcijo", "povprecno_na_transakcijo"),
            ("f", "PoglediPredNakupom", "pogledi_pred_nakupom"),
            ("f", "znesekPopusta", "znesek_popusta"),
            ("f", "obiskiNaUporabnika", "obiski_na_uporabnika"),
            ("f", "steviloTransakcijPoClanstvu", "steviloTransakcijPoClanstvu"),
            ("f", "steviloKupcevPoDemografiji", "steviloKupcevPoDemografiji"),
            ("f", "stopnjaVracil", "stopnja_vracil"),
        ];

        Self {
            view_name: "fact_with_dim".to_string(),
            fact: TableRef::new("tabela_dejstev", "f"),
            dimensions: vec![
                DimensionJoin::new("Cas", "c", "tk_id_datum", "idDatum"),
                DimensionJoin::new("Lokacija", "l", "tk_id_lokacija", "idLokacija"),
                DimensionJoin::new("Kupec", "k", "tk_id_kupec", "idKupec"),
                DimensionJoin::new("Izdelek", "i", "tk_id_izdelek", "idIzdelek"),
                DimensionJoin::new("Popust", "p", "tk_id_popust", "idPopust"),
                DimensionJoin::new(
                    "SocioekonomskiProfil",
                    "s",
                    "tk_id_socioekonomski_profil",
                    "idSocioekonomskiProfil",
                ),
                DimensionJoin::new("Demografija", "d", "tk_id_demografija", "idDemografija"),
            ],
            columns: columns
                .into_iter()
                .map(|(source, column, alias)| ViewColumn::new(source, column, alias))
                .collect(),
        }
    }
}

impl StarSchema {
    /// Lists the fact table followed by every joined dimension table.
    pub fn tables(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.fact.table.as_str())
            .chain(self.dimensions.iter().map(|join| join.dimension.table.as_str()))
    }

    /// Returns the `CREATE VIEW` statement for this layout.
    pub fn view_sql(&self) -> String {
        let select_list = self
            .columns
            .iter()
            .map(|column| {
                format!(
                    "  {}.{} AS {}",
                    column.source_alias,
                    quote_identifier(&column.column),
                    quote_identifier(&column.alias)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");

        let mut sql = format!(
            "CREATE VIEW {} AS\nSELECT\n{}\nFROM {} {}",
            quote_identifier(&self.view_name),
            select_list,
            quote_identifier(&self.fact.table),
            self.fact.alias
        );
        for join in &self.dimensions {
            sql.push_str(&format!(
                "\nLEFT JOIN {} {} ON {}.{} = {}.{}",
                quote_identifier(&join.dimension.table),
                join.dimension.alias,
                self.fact.alias,
                quote_identifier(&join.fact_key),
                join.dimension.alias,
                quote_identifier(&join.dim_key)
            ));
        }
        sql
    }
}

/// Replaces the reporting view described by `schema`.
pub fn create_view(connection: &Connection, schema: &StarSchema) -> Result<(), LoadError> {
    connection.execute_batch(&format!(
        "DROP VIEW IF EXISTS {};\n{};",
        quote_identifier(&schema.view_name),
        schema.view_sql()
    ))?;
    info!(
        "Created view `{}` over {} with {} dimensions",
        schema.view_name,
        schema.fact.table,
        schema.dimensions.len()
    );
    Ok(())
}
