//! The static directory of schools under DIRENS.
//!
//! Teachers are partitioned by the school acronym (`sigla`). The directory is
//! seeded into `schools.json` the first time a store is opened.

use serde::{Deserialize, Serialize};

/// One school of the directory, keyed by its acronym.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
  /// Acronym; the map key in `schools.json`, not repeated in the value.
  #[serde(skip)]
  pub sigla:         String,
  pub codigo:        String,
  pub nome_completo: String,
  pub endereco:      String,
  pub cidade:        String,
  pub estado:        String,
  pub telefone:      String,
}

struct Seed {
  sigla:         &'static str,
  codigo:        &'static str,
  nome_completo: &'static str,
  endereco:      &'static str,
  cidade:        &'static str,
  estado:        &'static str,
  telefone:      &'static str,
}

const DIRECTORY: &[Seed] = &[
  Seed {
    sigla:         "DIRENS",
    codigo:        "DIRENS01",
    nome_completo: "Diretoria de Ensino da Aeronáutica",
    endereco:      "Av. Marechal Fontenelle, 1000 - Campo dos Afonsos",
    cidade:        "Rio de Janeiro",
    estado:        "RJ",
    telefone:      "(21) 2441-5000",
  },
  Seed {
    sigla:         "AFA",
    codigo:        "AFA01",
    nome_completo: "Academia da Força Aérea",
    endereco:      "Rodovia Marechal do Ar Márcio de Souza e Mello, s/n",
    cidade:        "Pirassununga",
    estado:        "SP",
    telefone:      "(19) 3565-1234",
  },
  Seed {
    sigla:         "CBNB",
    codigo:        "CBNB01",
    nome_completo: "Colégio Brigadeiro Newton Braga",
    endereco:      "Av. Mal. Fontenelle, 1000 - Sulacap",
    cidade:        "Rio de Janeiro",
    estado:        "RJ",
    telefone:      "(21) 3441-9000",
  },
  Seed {
    sigla:         "CIAAR",
    codigo:        "CIAAR01",
    nome_completo: "Centro de Instrução e Adaptação da Aeronáutica",
    endereco:      "Av. Marechal Fontenelle, 1000 - Campo dos Afonsos",
    cidade:        "Rio de Janeiro",
    estado:        "RJ",
    telefone:      "(21) 2441-7000",
  },
  Seed {
    sigla:         "CTRB",
    codigo:        "CTRB01",
    nome_completo: "Colégio Tenente Rêgo Barros",
    endereco:      "Av. Júlio César, 9001 - Val-de-Cans",
    cidade:        "Belém",
    estado:        "PA",
    telefone:      "(91) 3210-4000",
  },
  Seed {
    sigla:         "ECE",
    codigo:        "ECE01",
    nome_completo: "Escola Caminho das Estrelas",
    endereco:      "Rua Santos Dumont, 149 - Centro",
    cidade:        "São José dos Campos",
    estado:        "SP",
    telefone:      "(12) 3947-5000",
  },
  Seed {
    sigla:         "EEAR",
    codigo:        "EEAR01",
    nome_completo: "Escola de Especialista de Aeronáutica",
    endereco:      "Av. Marechal do Ar Márcio de Souza e Mello, 321",
    cidade:        "Guaratinguetá",
    estado:        "SP",
    telefone:      "(12) 3125-9000",
  },
  Seed {
    sigla:         "EPCAR",
    codigo:        "EPCAR01",
    nome_completo: "Escola Preparatória de Cadetes do Ar",
    endereco:      "Rod. MG-179, Km 3 - Aeroporto",
    cidade:        "Barbacena",
    estado:        "MG",
    telefone:      "(32) 3339-4000",
  },
  Seed {
    sigla:         "EAOAR",
    codigo:        "EAOAR01",
    nome_completo: "Escola de Aperfeiçoamento de Oficiais da Aeronáutica",
    endereco:      "Av. Marechal Fontenelle, 1000 - Campo dos Afonsos",
    cidade:        "Rio de Janeiro",
    estado:        "RJ",
    telefone:      "(21) 2441-8000",
  },
  Seed {
    sigla:         "ECEMAR",
    codigo:        "ECEMAR01",
    nome_completo: "Escola de Comando Estado Maior da Aeronáutica",
    endereco:      "Av. Marechal Fontenelle, 1000 - Campo dos Afonsos",
    cidade:        "Rio de Janeiro",
    estado:        "RJ",
    telefone:      "(21) 2441-9000",
  },
  Seed {
    sigla:         "UNIFA",
    codigo:        "UNIFA01",
    nome_completo: "Universidade da Força Aérea",
    endereco:      "Estrada de Jacarepaguá, 9007 - Jacarepaguá",
    cidade:        "Rio de Janeiro",
    estado:        "RJ",
    telefone:      "(21) 2136-7000",
  },
];

/// The built-in directory, in declaration order.
pub fn directory() -> Vec<School> {
  DIRECTORY
    .iter()
    .map(|s| School {
      sigla:         s.sigla.to_owned(),
      codigo:        s.codigo.to_owned(),
      nome_completo: s.nome_completo.to_owned(),
      endereco:      s.endereco.to_owned(),
      cidade:        s.cidade.to_owned(),
      estado:        s.estado.to_owned(),
      telefone:      s.telefone.to_owned(),
    })
    .collect()
}
